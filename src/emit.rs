use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::classify::{Classification, Reason, Verdict};
use crate::data::model::{InputRecord, Label, ReportCoordinate};
use crate::error::{CoregError, Result};

// ---------------------------------------------------------------------------
// Line format
// ---------------------------------------------------------------------------

/// Format one output line, terminator included.
///
/// * categorized:   `<payload>,,<label>,<rx>,<ry>,<rz>`
/// * uncategorized: `<payload>,,<rx>,<ry>,<rz>`
pub fn format_record(payload: &str, report: ReportCoordinate, verdict: Verdict) -> String {
    let r = report.0;
    match verdict {
        Verdict::Categorized(label) => {
            format!("{payload},,{label},{},{},{}\n", r.x, r.y, r.z)
        }
        Verdict::Uncategorized => format!("{payload},,{},{},{}\n", r.x, r.y, r.z),
    }
}

// ---------------------------------------------------------------------------
// Output sinks
// ---------------------------------------------------------------------------

/// The categorized / uncategorized writer pair. Each has a single writer.
pub struct OutputSinks<W: Write> {
    categorized: W,
    uncategorized: W,
    categorized_path: PathBuf,
    uncategorized_path: PathBuf,
}

impl OutputSinks<BufWriter<File>> {
    /// Open both files, truncating unless `append` is set (resumed runs).
    pub fn create(categorized: &Path, uncategorized: &Path, append: bool) -> Result<Self> {
        Ok(OutputSinks {
            categorized: BufWriter::new(open_sink(categorized, append)?),
            uncategorized: BufWriter::new(open_sink(uncategorized, append)?),
            categorized_path: categorized.to_path_buf(),
            uncategorized_path: uncategorized.to_path_buf(),
        })
    }
}

fn open_sink(path: &Path, append: bool) -> Result<File> {
    let mut opts = OpenOptions::new();
    if append {
        opts.append(true).create(true);
    } else {
        opts.write(true).create(true).truncate(true);
    }
    opts.open(path).map_err(|e| CoregError::io(path, e))
}

impl<W: Write> OutputSinks<W> {
    /// Wrap arbitrary writers; errors name them `<categorized>` / `<uncategorized>`.
    pub fn new(categorized: W, uncategorized: W) -> Self {
        OutputSinks {
            categorized,
            uncategorized,
            categorized_path: PathBuf::from("<categorized>"),
            uncategorized_path: PathBuf::from("<uncategorized>"),
        }
    }

    /// Route a formatted line to the sink matching its verdict.
    pub fn write(&mut self, record: &InputRecord, report: ReportCoordinate, verdict: Verdict) -> Result<()> {
        let line = format_record(record.payload(), report, verdict);
        let (sink, path) = match verdict {
            Verdict::Categorized(_) => (&mut self.categorized, &self.categorized_path),
            Verdict::Uncategorized => (&mut self.uncategorized, &self.uncategorized_path),
        };
        sink.write_all(line.as_bytes())
            .map_err(|e| CoregError::io(path, e))
    }

    /// Flush both sinks and hand the writers back. Consumes the pair so it
    /// can only happen once.
    pub fn finish(mut self) -> Result<(W, W)> {
        self.categorized
            .flush()
            .map_err(|e| CoregError::io(&self.categorized_path, e))?;
        self.uncategorized
            .flush()
            .map_err(|e| CoregError::io(&self.uncategorized_path, e))?;
        Ok((self.categorized, self.uncategorized))
    }
}

// ---------------------------------------------------------------------------
// Diagnostics CSV
// ---------------------------------------------------------------------------

/// One row of the optional per-record diagnostics file.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticRow {
    pub line: usize,
    pub categorized: bool,
    pub label: Option<Label>,
    pub reason: Reason,
    pub mode_label: Option<Label>,
    pub mode_count: Option<u64>,
    pub second_count: Option<u64>,
    pub total_voxels: u64,
    pub report_x: i64,
    pub report_y: i64,
    pub report_z: i64,
}

impl DiagnosticRow {
    pub fn new(line: usize, report: ReportCoordinate, c: &Classification) -> Self {
        DiagnosticRow {
            line,
            categorized: c.verdict.is_categorized(),
            label: c.verdict.label(),
            reason: c.reason,
            mode_label: c.mode.map(|(l, _)| l),
            mode_count: c.mode.map(|(_, n)| n),
            second_count: c.second_count,
            total_voxels: c.total_voxels,
            report_x: report.0.x,
            report_y: report.0.y,
            report_z: report.0.z,
        }
    }
}

/// CSV writer for [`DiagnosticRow`]s, with a header row.
pub struct DiagnosticsWriter<W: Write> {
    writer: csv::Writer<W>,
    path: PathBuf,
}

impl DiagnosticsWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| CoregError::io(path, e))?;
        Ok(DiagnosticsWriter {
            writer: csv::Writer::from_writer(file),
            path: path.to_path_buf(),
        })
    }
}

impl<W: Write> DiagnosticsWriter<W> {
    pub fn from_writer(writer: W) -> Self {
        DiagnosticsWriter {
            writer: csv::Writer::from_writer(writer),
            path: PathBuf::from("<diagnostics>"),
        }
    }

    pub fn record(&mut self, row: &DiagnosticRow) -> Result<()> {
        self.writer.serialize(row).map_err(|e| self.csv_error(e))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| CoregError::io(&self.path, e))
    }

    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        let path = self.path;
        self.writer.into_inner().map_err(|e| {
            let source = std::io::Error::new(e.error().kind(), e.error().to_string());
            CoregError::io(path, source)
        })
    }

    fn csv_error(&self, e: csv::Error) -> CoregError {
        let source = match e.into_kind() {
            csv::ErrorKind::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::Other, format!("{other:?}")),
        };
        CoregError::io(&self.path, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Vec3, WorldCoordinate};

    fn record(raw: &str) -> InputRecord {
        InputRecord {
            line_no: 1,
            raw: raw.to_string(),
            world: WorldCoordinate(Vec3::new(0, 0, 0)),
        }
    }

    #[test]
    fn categorized_line_format() {
        let line = format_record(
            "100.5,200,300,abc",
            ReportCoordinate(Vec3::new(-3047, -2510, 7907)),
            Verdict::Categorized(864691135),
        );
        assert_eq!(line, "100.5,200,300,abc,,864691135,-3047,-2510,7907\n");
    }

    #[test]
    fn uncategorized_line_format() {
        let line = format_record(
            "1,2,3",
            ReportCoordinate(Vec3::new(4, 5, 6)),
            Verdict::Uncategorized,
        );
        assert_eq!(line, "1,2,3,,4,5,6\n");
    }

    #[test]
    fn sinks_route_by_verdict() {
        let mut sinks = OutputSinks::new(Vec::new(), Vec::new());
        let report = ReportCoordinate(Vec3::new(1, 2, 3));
        sinks.write(&record(" a \n"), report, Verdict::Categorized(9)).unwrap();
        sinks.write(&record("b"), report, Verdict::Uncategorized).unwrap();
        sinks.write(&record("c"), report, Verdict::Categorized(8)).unwrap();
        let (cat, uncat) = sinks.finish().unwrap();
        assert_eq!(String::from_utf8(cat).unwrap(), "a,,9,1,2,3\nc,,8,1,2,3\n");
        assert_eq!(String::from_utf8(uncat).unwrap(), "b,,1,2,3\n");
    }

    #[test]
    fn append_mode_keeps_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let cat = dir.path().join("cat.csv");
        let uncat = dir.path().join("uncat.csv");
        std::fs::write(&cat, "old\n").unwrap();
        std::fs::write(&uncat, "old\n").unwrap();

        let mut sinks = OutputSinks::create(&cat, &uncat, true).unwrap();
        sinks
            .write(&record("new"), ReportCoordinate(Vec3::new(0, 0, 0)), Verdict::Uncategorized)
            .unwrap();
        sinks.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&cat).unwrap(), "old\n");
        assert_eq!(std::fs::read_to_string(&uncat).unwrap(), "old\nnew,,0,0,0\n");

        let sinks = OutputSinks::create(&cat, &uncat, false).unwrap();
        sinks.finish().unwrap();
        assert_eq!(std::fs::read_to_string(&cat).unwrap(), "");
    }

    #[test]
    fn unopenable_sink_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no/such/dir/cat.csv");
        let ok = dir.path().join("uncat.csv");
        match OutputSinks::create(&missing, &ok, false) {
            Err(CoregError::Io { path, .. }) => assert_eq!(path, missing),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected an I/O error"),
        }
    }

    #[test]
    fn diagnostics_rows_serialize_with_header() {
        let mut diag = DiagnosticsWriter::from_writer(Vec::new());
        let report = ReportCoordinate(Vec3::new(7, 8, 9));
        diag.record(&DiagnosticRow::new(
            3,
            report,
            &Classification::accepted(5, 20, Some(4), 64),
        ))
        .unwrap();
        diag.record(&DiagnosticRow::new(4, report, &Classification::unavailable(64)))
            .unwrap();
        let out = String::from_utf8(diag.finish().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines[0],
            "line,categorized,label,reason,mode_label,mode_count,second_count,total_voxels,report_x,report_y,report_z"
        );
        assert_eq!(lines[1], "3,true,5,accepted,5,20,4,64,7,8,9");
        assert_eq!(lines[2], "4,false,,source_unavailable,,,,64,7,8,9");
    }
}
