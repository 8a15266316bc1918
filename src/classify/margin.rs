use super::histogram::Histogram;
use super::{Classification, Reason};
use crate::data::model::Extent;
use crate::error::{CoregError, Result};

/// Categorize when, ignoring background, the top segment has at least
/// `min_voxel_count` voxels and beats the runner-up by `margin_multiplier`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginMajority {
    min_voxel_count: u64,
    margin_multiplier: f64,
    box_extent: Extent,
}

impl MarginMajority {
    pub const DEFAULT_MIN_VOXEL_COUNT: u64 = 15_000;
    pub const DEFAULT_MARGIN_MULTIPLIER: f64 = 1.5;
    pub const DEFAULT_BOX: Extent = Extent::new(32, 32, 128);

    pub fn new(min_voxel_count: u64, margin_multiplier: f64, box_extent: Extent) -> Result<Self> {
        if !(margin_multiplier.is_finite() && margin_multiplier >= 1.0) {
            return Err(CoregError::Config(format!(
                "margin multiplier must be a finite number >= 1, got {margin_multiplier}"
            )));
        }
        super::check_box(box_extent)?;
        Ok(MarginMajority {
            min_voxel_count,
            margin_multiplier,
            box_extent,
        })
    }

    pub fn box_extent(&self) -> Extent {
        self.box_extent
    }

    pub fn classify(&self, histogram: &Histogram) -> Classification {
        let total = self.box_extent.volume();
        let reason_if_empty = if histogram.is_empty() {
            Reason::NoData
        } else {
            Reason::BackgroundOnly
        };
        let segments = histogram.without_background();
        let Some((label, count)) = segments.mode() else {
            return Classification::rejected(reason_if_empty, None, None, total);
        };
        let mode = Some((label, count));
        if count < self.min_voxel_count {
            return Classification::rejected(Reason::BelowMinCount, mode, None, total);
        }

        let second = segments.runner_up(label).map_or(0, |(_, c)| c);
        if count as f64 >= self.margin_multiplier * second as f64 {
            Classification::accepted(label, count, Some(second), total)
        } else {
            Classification::rejected(Reason::InsufficientMargin, mode, Some(second), total)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Verdict;

    fn defaults() -> MarginMajority {
        MarginMajority::new(15_000, 1.5, MarginMajority::DEFAULT_BOX).unwrap()
    }

    #[test]
    fn clear_winner_without_background() {
        let h = Histogram::from_counts([(5, 20_000), (6, 10_000)]);
        let result = defaults().classify(&h);
        assert_eq!(result.verdict, Verdict::Categorized(5));
        assert_eq!(result.second_count, Some(10_000));
    }

    #[test]
    fn mode_below_minimum_count() {
        let c = MarginMajority::new(1000, 1.5, Extent::new(10, 10, 20)).unwrap();
        let h = Histogram::from_counts([(0, 500), (3, 800), (9, 700)]);
        let result = c.classify(&h);
        assert_eq!(result.verdict, Verdict::Uncategorized);
        assert_eq!(result.reason, Reason::BelowMinCount);
        assert_eq!(result.mode, Some((3, 800)));
    }

    #[test]
    fn background_never_wins_even_when_dominant() {
        let c = MarginMajority::new(10, 1.5, Extent::new(10, 10, 10)).unwrap();
        let h = Histogram::from_counts([(0, 900), (4, 60), (8, 40)]);
        assert_eq!(c.classify(&h).verdict, Verdict::Categorized(4));
    }

    #[test]
    fn single_segment_has_zero_runner_up() {
        let h = Histogram::from_counts([(0, 100_000), (11, 15_000)]);
        let result = defaults().classify(&h);
        assert_eq!(result.verdict, Verdict::Categorized(11));
        assert_eq!(result.second_count, Some(0));
    }

    #[test]
    fn insufficient_margin() {
        let h = Histogram::from_counts([(5, 20_000), (6, 14_000)]);
        let result = defaults().classify(&h);
        assert_eq!(result.verdict, Verdict::Uncategorized);
        assert_eq!(result.reason, Reason::InsufficientMargin);
        assert_eq!(result.second_count, Some(14_000));
    }

    #[test]
    fn margin_exactly_met_passes() {
        let h = Histogram::from_counts([(5, 15_000), (6, 10_000)]);
        assert_eq!(defaults().classify(&h).verdict, Verdict::Categorized(5));
    }

    #[test]
    fn all_segments_tied_is_uncategorized() {
        let h = Histogram::from_counts([(2, 20_000), (3, 20_000), (4, 20_000)]);
        let result = defaults().classify(&h);
        assert_eq!(result.verdict, Verdict::Uncategorized);
        assert_eq!(result.mode, Some((2, 20_000)));
        assert_eq!(result.second_count, Some(20_000));
    }

    #[test]
    fn tie_with_unit_multiplier_picks_lowest_label() {
        let c = MarginMajority::new(1, 1.0, Extent::new(4, 4, 4)).unwrap();
        let h = Histogram::from_counts([(9, 30), (4, 30)]);
        assert_eq!(c.classify(&h).verdict, Verdict::Categorized(4));
    }

    #[test]
    fn background_only_and_empty() {
        let only_bg = defaults().classify(&Histogram::from_counts([(0, 131_072)]));
        assert_eq!(only_bg.verdict, Verdict::Uncategorized);
        assert_eq!(only_bg.reason, Reason::BackgroundOnly);

        let empty = defaults().classify(&Histogram::default());
        assert_eq!(empty.verdict, Verdict::Uncategorized);
        assert_eq!(empty.reason, Reason::NoData);
    }

    #[test]
    fn rejects_multiplier_below_one() {
        assert!(MarginMajority::new(1, 0.99, MarginMajority::DEFAULT_BOX).is_err());
        assert!(MarginMajority::new(1, f64::INFINITY, MarginMajority::DEFAULT_BOX).is_err());
    }
}
