use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::model::{Extent, InputRecord, Label, Vec3, WorldCoordinate};
use crate::error::CoregError;
use crate::volume::{LabelVolume, MipStack};

// ---------------------------------------------------------------------------
// Coordinate input
// ---------------------------------------------------------------------------

/// One unparsed line of the coordinate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based line number.
    pub line_no: usize,
    /// Line contents without the trailing `\n` / `\r\n`.
    pub text: String,
}

/// Lazy, pull-based reader over coordinate lines.
///
/// Restartable: `starting_at(n)` skips the first `n` lines so an interrupted
/// run can resume where it stopped. Line numbers stay absolute. A line that
/// is not UTF-8 comes back as a [`CoregError::Parse`] for that line and
/// reading carries on; a failed read is a [`CoregError::Read`].
pub struct InputReader<R> {
    reader: R,
    name: PathBuf,
    line_no: usize,
    skip: usize,
    buf: Vec<u8>,
}

impl InputReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening input file {}", path.display()))?;
        Ok(InputReader::new(BufReader::new(file)).with_name(path))
    }
}

impl<R: BufRead> InputReader<R> {
    pub fn new(reader: R) -> Self {
        InputReader {
            reader,
            name: PathBuf::from("<input>"),
            line_no: 0,
            skip: 0,
            buf: Vec::new(),
        }
    }

    /// Name used when reporting read errors.
    pub fn with_name(mut self, name: impl Into<PathBuf>) -> Self {
        self.name = name.into();
        self
    }

    /// Skip the first `offset` lines before yielding anything.
    pub fn starting_at(mut self, offset: usize) -> Self {
        self.skip = offset;
        self
    }

    /// Pull the next line's bytes into `buf`, terminator stripped.
    fn fill(&mut self) -> Result<bool, CoregError> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|source| CoregError::Read {
                path: self.name.clone(),
                line: self.line_no,
                source,
            })?;
        if n == 0 {
            return Ok(false);
        }
        self.line_no += 1;
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(true)
    }
}

impl<R: BufRead> Iterator for InputReader<R> {
    type Item = Result<RawLine, CoregError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.skip > 0 {
            match self.fill() {
                Ok(true) => self.skip -= 1,
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
        match self.fill() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => return Some(Err(e)),
        }
        let line_no = self.line_no;
        Some(match std::str::from_utf8(&self.buf) {
            Ok(text) => Ok(RawLine {
                line_no,
                text: text.to_string(),
            }),
            Err(e) => Err(CoregError::Parse {
                line: line_no,
                message: format!("not valid UTF-8 ({e})"),
            }),
        })
    }
}

/// Parse the leading `x,y,z` nanometer fields of a line.
///
/// Each field is read as a floating-point literal and truncated toward zero;
/// anything after the third field is left untouched in `raw`.
pub fn parse_record(line: RawLine) -> Result<InputRecord, CoregError> {
    let mut fields = line.text.split(',');
    let mut coords = [0i64; 3];
    for (axis, slot) in ["x", "y", "z"].iter().zip(coords.iter_mut()) {
        let field = fields.next().ok_or_else(|| CoregError::Parse {
            line: line.line_no,
            message: format!("missing '{axis}' coordinate"),
        })?;
        *slot = parse_nanometers(field).map_err(|message| CoregError::Parse {
            line: line.line_no,
            message: format!("{axis}: {message}"),
        })?;
    }
    Ok(InputRecord {
        line_no: line.line_no,
        raw: line.text,
        world: WorldCoordinate(Vec3::from(coords)),
    })
}

fn parse_nanometers(field: &str) -> Result<i64, String> {
    let tok = field.trim();
    let value: f64 = tok
        .parse()
        .map_err(|_| format!("'{tok}' is not a number"))?;
    if !value.is_finite() {
        return Err(format!("'{tok}' is not finite"));
    }
    if value >= i64::MAX as f64 || value <= i64::MIN as f64 {
        return Err(format!("'{tok}' is out of range"));
    }
    Ok(value.trunc() as i64)
}

// ---------------------------------------------------------------------------
// Volume manifest
// ---------------------------------------------------------------------------

/// JSON manifest describing a multi-level label volume on disk.
///
/// ```json
/// {
///   "levels": [
///     { "mip": 5, "voxel_offset": [0, 0, 0], "size": [64, 64, 64], "data": "mip5.raw" }
///   ]
/// }
/// ```
///
/// `data` is resolved relative to the manifest and holds little-endian `u64`
/// labels in x-fastest order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeManifest {
    pub levels: Vec<LevelManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelManifest {
    pub mip: u32,
    pub voxel_offset: Vec3,
    pub size: Extent,
    pub data: PathBuf,
}

/// Load every level listed in a manifest into memory.
pub fn load_volume_manifest(path: &Path) -> Result<MipStack> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading volume manifest {}", path.display()))?;
    let manifest: VolumeManifest = serde_json::from_str(&text)
        .with_context(|| format!("parsing volume manifest {}", path.display()))?;

    if manifest.levels.is_empty() {
        bail!("volume manifest {} lists no levels", path.display());
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut stack = MipStack::new();
    for level in &manifest.levels {
        let data_path = base.join(&level.data);
        let labels = read_raw_labels(&data_path, level.size)
            .with_context(|| format!("loading mip {}", level.mip))?;
        let volume = LabelVolume::new(level.voxel_offset, level.size, labels)
            .with_context(|| format!("mip {}", level.mip))?;
        log::debug!(
            "loaded mip {} ({} at offset {}) from {}",
            level.mip,
            level.size,
            level.voxel_offset,
            data_path.display()
        );
        if stack.insert(level.mip, volume).is_some() {
            bail!("mip {} listed twice in {}", level.mip, path.display());
        }
    }
    Ok(stack)
}

fn read_raw_labels(path: &Path, size: Extent) -> Result<Vec<Label>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let expected = size
        .checked_volume()
        .and_then(|n| usize::try_from(n).ok())
        .and_then(|n| n.checked_mul(std::mem::size_of::<Label>()))
        .with_context(|| format!("{}: volume size {size} is too large", path.display()))?;
    if bytes.len() != expected {
        bail!(
            "{}: expected {expected} bytes for {size}, found {}",
            path.display(),
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(std::mem::size_of::<Label>())
        .map(|chunk| {
            let mut le = [0u8; 8];
            le.copy_from_slice(chunk);
            Label::from_le_bytes(le)
        })
        .collect())
}

/// Write labels as little-endian `u64`, the layout `load_volume_manifest` reads.
pub fn write_raw_labels(path: &Path, labels: &[Label]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = io::BufWriter::new(file);
    for label in labels {
        out.write_all(&label.to_le_bytes())
            .with_context(|| format!("writing {}", path.display()))?;
    }
    out.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}
