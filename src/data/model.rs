use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A segment identifier. `0` is reserved for background / no data.
pub type Label = u64;

/// The reserved background label.
pub const BACKGROUND: Label = 0;

// ---------------------------------------------------------------------------
// Vec3 – integer 3-vector shared by every coordinate frame
// ---------------------------------------------------------------------------

/// Integer 3-vector. Serialized as a `[x, y, z]` array so config files stay terse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i64; 3]", into = "[i64; 3]")]
pub struct Vec3 {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Vec3 {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Vec3 { x, y, z }
    }

    pub fn to_array(self) -> [i64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[i64; 3]> for Vec3 {
    fn from(a: [i64; 3]) -> Self {
        Vec3::new(a[0], a[1], a[2])
    }
}

impl From<Vec3> for [i64; 3] {
    fn from(v: Vec3) -> Self {
        v.to_array()
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Coordinate frames
// ---------------------------------------------------------------------------

/// Input coordinate in nanometers, truncated to integers at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldCoordinate(pub Vec3);

/// Voxel coordinate at the level the volume source is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplingCoordinate(pub Vec3);

/// Voxel coordinate in the human-facing frame (one level finer in x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportCoordinate(pub Vec3);

impl fmt::Display for SamplingCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ReportCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Extent – shape of a sampled box
// ---------------------------------------------------------------------------

/// Box extent in voxels along x, y, z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[usize; 3]", into = "[usize; 3]")]
pub struct Extent {
    pub dx: usize,
    pub dy: usize,
    pub dz: usize,
}

impl Extent {
    pub const fn new(dx: usize, dy: usize, dz: usize) -> Self {
        Extent { dx, dy, dz }
    }

    /// Total number of voxels in the box, saturating at `u64::MAX`.
    pub fn volume(&self) -> u64 {
        self.checked_volume().unwrap_or(u64::MAX)
    }

    pub fn checked_volume(&self) -> Option<u64> {
        (self.dx as u64)
            .checked_mul(self.dy as u64)?
            .checked_mul(self.dz as u64)
    }

    pub fn is_degenerate(&self) -> bool {
        self.dx == 0 || self.dy == 0 || self.dz == 0
    }
}

impl From<[usize; 3]> for Extent {
    fn from(a: [usize; 3]) -> Self {
        Extent::new(a[0], a[1], a[2])
    }
}

impl From<Extent> for [usize; 3] {
    fn from(e: Extent) -> Self {
        [e.dx, e.dy, e.dz]
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.dx, self.dy, self.dz)
    }
}

/// Accepts `8x8x32` or `8,8,32`.
impl FromStr for Extent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(|c| c == 'x' || c == ',').collect();
        if parts.len() != 3 {
            return Err(format!("expected three extents like 8x8x32, got '{s}'"));
        }
        let mut dims = [0usize; 3];
        for (slot, part) in dims.iter_mut().zip(&parts) {
            *slot = part
                .trim()
                .parse()
                .map_err(|_| format!("'{part}' is not a voxel count"))?;
        }
        Ok(Extent::from(dims))
    }
}

// ---------------------------------------------------------------------------
// InputRecord – one parsed line of the coordinate file
// ---------------------------------------------------------------------------

/// A single input line together with its parsed nanometer coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    /// 1-based line number in the input file.
    pub line_no: usize,
    /// The line exactly as read, minus its line terminator.
    pub raw: String,
    pub world: WorldCoordinate,
}

impl InputRecord {
    /// The prefix carried into the output line.
    pub fn payload(&self) -> &str {
        self.raw.trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_parses_both_separators() {
        assert_eq!("8x8x32".parse::<Extent>().unwrap(), Extent::new(8, 8, 32));
        assert_eq!("32, 32, 128".parse::<Extent>().unwrap(), Extent::new(32, 32, 128));
        assert!("8x8".parse::<Extent>().is_err());
        assert!("8xax8".parse::<Extent>().is_err());
    }

    #[test]
    fn extent_volume() {
        assert_eq!(Extent::new(8, 8, 32).volume(), 2048);
        assert!(Extent::new(8, 0, 32).is_degenerate());
        let huge = Extent::new(1 << 32, 1 << 32, 2);
        assert_eq!(huge.checked_volume(), None);
        assert_eq!(huge.volume(), u64::MAX);
    }

    #[test]
    fn payload_is_trimmed() {
        let rec = InputRecord {
            line_no: 1,
            raw: "  1,2,3,extra \t".to_string(),
            world: WorldCoordinate(Vec3::new(1, 2, 3)),
        };
        assert_eq!(rec.payload(), "1,2,3,extra");
    }
}
