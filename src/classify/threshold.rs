use super::histogram::Histogram;
use super::{Classification, Reason};
use crate::data::model::{BACKGROUND, Extent};
use crate::error::{CoregError, Result};

/// Categorize when the overall mode is not background and fills at least
/// `threshold` of the sampled box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdMajority {
    threshold: f64,
    box_extent: Extent,
}

impl ThresholdMajority {
    pub const DEFAULT_THRESHOLD: f64 = 0.5;
    pub const DEFAULT_BOX: Extent = Extent::new(8, 8, 32);

    pub fn new(threshold: f64, box_extent: Extent) -> Result<Self> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(CoregError::Config(format!(
                "threshold must be in (0, 1], got {threshold}"
            )));
        }
        super::check_box(box_extent)?;
        Ok(ThresholdMajority {
            threshold,
            box_extent,
        })
    }

    pub fn box_extent(&self) -> Extent {
        self.box_extent
    }

    pub fn classify(&self, histogram: &Histogram) -> Classification {
        let total = self.box_extent.volume();
        let Some((label, count)) = histogram.mode() else {
            return Classification::rejected(Reason::NoData, None, None, total);
        };
        let mode = Some((label, count));
        if label == BACKGROUND {
            return Classification::rejected(Reason::BackgroundMode, mode, None, total);
        }
        if count as f64 >= self.threshold * total as f64 {
            Classification::accepted(label, count, None, total)
        } else {
            Classification::rejected(Reason::BelowThreshold, mode, None, total)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Verdict;

    fn classifier(threshold: f64, extent: Extent) -> ThresholdMajority {
        ThresholdMajority::new(threshold, extent).unwrap()
    }

    #[test]
    fn dominant_segment_is_categorized() {
        // box volume 2000
        let c = classifier(0.5, Extent::new(10, 10, 20));
        let h = Histogram::from_counts([(0, 100), (7, 1900)]);
        let result = c.classify(&h);
        assert_eq!(result.verdict, Verdict::Categorized(7));
        assert_eq!(result.reason, Reason::Accepted);
        assert_eq!(result.mode, Some((7, 1900)));
    }

    #[test]
    fn background_mode_is_uncategorized() {
        let c = classifier(0.1, Extent::new(10, 10, 20));
        let h = Histogram::from_counts([(0, 1500), (7, 500)]);
        let result = c.classify(&h);
        assert_eq!(result.verdict, Verdict::Uncategorized);
        assert_eq!(result.reason, Reason::BackgroundMode);
    }

    #[test]
    fn share_exactly_at_threshold_passes() {
        let c = classifier(0.5, Extent::new(4, 4, 4));
        let h = Histogram::from_counts([(3, 32), (4, 32)]);
        assert_eq!(c.classify(&h).verdict, Verdict::Categorized(3));

        let h = Histogram::from_counts([(3, 31), (4, 30), (0, 3)]);
        let result = c.classify(&h);
        assert_eq!(result.verdict, Verdict::Uncategorized);
        assert_eq!(result.reason, Reason::BelowThreshold);
    }

    #[test]
    fn empty_histogram_is_uncategorized() {
        let c = classifier(0.5, ThresholdMajority::DEFAULT_BOX);
        let result = c.classify(&Histogram::default());
        assert_eq!(result.verdict, Verdict::Uncategorized);
        assert_eq!(result.reason, Reason::NoData);
        assert_eq!(result.mode, None);
    }

    #[test]
    fn full_threshold_requires_whole_box() {
        let c = classifier(1.0, Extent::new(2, 2, 2));
        assert_eq!(
            c.classify(&Histogram::from_counts([(5, 8)])).verdict,
            Verdict::Categorized(5)
        );
        assert_eq!(
            c.classify(&Histogram::from_counts([(5, 7), (6, 1)])).verdict,
            Verdict::Uncategorized
        );
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let extent = ThresholdMajority::DEFAULT_BOX;
        assert!(ThresholdMajority::new(0.0, extent).is_err());
        assert!(ThresholdMajority::new(1.01, extent).is_err());
        assert!(ThresholdMajority::new(f64::NAN, extent).is_err());
        assert!(ThresholdMajority::new(0.5, Extent::new(8, 0, 32)).is_err());
    }
}
