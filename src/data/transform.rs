use super::model::{ReportCoordinate, SamplingCoordinate, Vec3, WorldCoordinate};

/// Integer division rounding toward negative infinity.
///
/// Rust's `/` truncates toward zero, which places negative coordinates one
/// voxel off near the frame origin.
pub fn floor_div(a: i64, b: i64) -> i64 {
    a.div_euclid(b) - if b < 0 && a.rem_euclid(b) != 0 { 1 } else { 0 }
}

fn floor_div_vec(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(floor_div(a.x, b.x), floor_div(a.y, b.y), floor_div(a.z, b.z))
}

/// Fixed affine mapping from nanometers into the sampling and report frames.
///
/// ```text
/// report   = floor(world / resolution) + offset
/// sampling = floor(report / sampling_factor)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateTransformer {
    resolution: Vec3,
    offset: Vec3,
    sampling_factor: Vec3,
}

impl CoordinateTransformer {
    /// Callers validate that no component of `resolution` or
    /// `sampling_factor` is zero (see `Config::validate`).
    pub fn new(resolution: Vec3, offset: Vec3, sampling_factor: Vec3) -> Self {
        CoordinateTransformer {
            resolution,
            offset,
            sampling_factor,
        }
    }

    pub fn report(&self, world: WorldCoordinate) -> ReportCoordinate {
        let scaled = floor_div_vec(world.0, self.resolution);
        ReportCoordinate(Vec3::new(
            scaled.x + self.offset.x,
            scaled.y + self.offset.y,
            scaled.z + self.offset.z,
        ))
    }

    pub fn sampling(&self, report: ReportCoordinate) -> SamplingCoordinate {
        SamplingCoordinate(floor_div_vec(report.0, self.sampling_factor))
    }

    pub fn transform(&self, world: WorldCoordinate) -> (SamplingCoordinate, ReportCoordinate) {
        let report = self.report(world);
        (self.sampling(report), report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_transformer() -> CoordinateTransformer {
        CoordinateTransformer::new(
            Vec3::new(4, 4, 40),
            Vec3::new(-3072, -2560, 7900),
            Vec3::new(2, 2, 1),
        )
    }

    #[test]
    fn floor_div_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(-8, 2), -4);
        assert_eq!(floor_div(-1, 4), -1);
        assert_eq!(floor_div(0, 4), 0);
        assert_eq!(floor_div(7, -2), -4);
        assert_eq!(floor_div(-7, -2), 3);
    }

    #[test]
    fn transform_matches_hand_computed_frames() {
        let t = default_transformer();
        let (sampling, report) = t.transform(WorldCoordinate(Vec3::new(1_000_000, 800_000, 20_000)));
        assert_eq!(report.0, Vec3::new(250_000 - 3072, 200_000 - 2560, 500 + 7900));
        assert_eq!(
            sampling.0,
            Vec3::new((250_000 - 3072) / 2, (200_000 - 2560) / 2, 8400)
        );
    }

    #[test]
    fn negative_report_coordinates_floor() {
        let t = default_transformer();
        // 4 nm → report x = 1 - 3072 = -3071; sampling x = floor(-3071 / 2) = -1536
        let (sampling, report) = t.transform(WorldCoordinate(Vec3::new(4, -5, -1)));
        assert_eq!(report.0, Vec3::new(-3071, -2 - 2560, -1 + 7900));
        assert_eq!(sampling.0.x, -1536);
        assert_eq!(sampling.0.y, -1281);
        assert_eq!(sampling.0.z, 7899);
    }

    #[test]
    fn transform_is_deterministic() {
        let t = default_transformer();
        let w = WorldCoordinate(Vec3::new(-12_345, 67_890, -4_242));
        assert_eq!(t.transform(w), t.transform(w));
    }
}
