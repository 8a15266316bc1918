use std::collections::BTreeMap;

use crate::data::model::{BACKGROUND, Label};
use crate::volume::Cutout;

/// Voxel count per label, iterated in ascending label order.
///
/// Built from a cutout, the counts sum to the cutout's voxel count. A
/// "no data" cutout yields an empty histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    counts: BTreeMap<Label, u64>,
}

impl Histogram {
    pub fn from_cutout(cutout: &Cutout) -> Self {
        Self::from_labels(cutout.voxels().iter().copied())
    }

    pub fn from_labels(labels: impl IntoIterator<Item = Label>) -> Self {
        let mut counts = BTreeMap::new();
        for label in labels {
            *counts.entry(label).or_insert(0u64) += 1;
        }
        Histogram { counts }
    }

    /// Build directly from `(label, count)` pairs. Zero counts are dropped.
    pub fn from_counts(pairs: impl IntoIterator<Item = (Label, u64)>) -> Self {
        let mut counts = BTreeMap::new();
        for (label, count) in pairs {
            if count > 0 {
                *counts.entry(label).or_insert(0u64) += count;
            }
        }
        Histogram { counts }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, label: Label) -> u64 {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Label, u64)> + '_ {
        self.counts.iter().map(|(&l, &c)| (l, c))
    }

    /// Copy of the histogram with the background entry removed.
    pub fn without_background(&self) -> Histogram {
        let mut counts = self.counts.clone();
        counts.remove(&BACKGROUND);
        Histogram { counts }
    }

    /// Most frequent label. Ties go to the lowest label.
    pub fn mode(&self) -> Option<(Label, u64)> {
        first_max(self.iter())
    }

    /// Most frequent label other than `exclude`. Ties go to the lowest label.
    pub fn runner_up(&self, exclude: Label) -> Option<(Label, u64)> {
        first_max(self.iter().filter(|&(l, _)| l != exclude))
    }
}

fn first_max(entries: impl Iterator<Item = (Label, u64)>) -> Option<(Label, u64)> {
    entries.fold(None, |best, (label, count)| match best {
        Some((_, best_count)) if best_count >= count => best,
        _ => Some((label, count)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Extent;

    #[test]
    fn counts_sum_to_cutout_volume() {
        let extent = Extent::new(2, 3, 4);
        let voxels: Vec<Label> = (0..24).map(|i| i % 5).collect();
        let cutout = Cutout::new(extent, voxels).unwrap();
        let h = Histogram::from_cutout(&cutout);
        assert_eq!(h.total(), extent.volume());
        assert_eq!(h.len(), 5);
        assert_eq!(h.count(0), 5);
        assert_eq!(h.count(4), 4);
    }

    #[test]
    fn no_data_cutout_is_empty() {
        let h = Histogram::from_cutout(&Cutout::no_data(Extent::new(8, 8, 32)));
        assert!(h.is_empty());
        assert_eq!(h.mode(), None);
    }

    #[test]
    fn mode_prefers_lowest_label_on_tie() {
        let h = Histogram::from_counts([(9, 10), (3, 10), (5, 2)]);
        assert_eq!(h.mode(), Some((3, 10)));
        assert_eq!(h.runner_up(3), Some((9, 10)));
    }

    #[test]
    fn runner_up_with_single_label() {
        let h = Histogram::from_counts([(42, 7)]);
        assert_eq!(h.runner_up(42), None);
    }

    #[test]
    fn without_background_drops_only_zero() {
        let h = Histogram::from_counts([(0, 100), (7, 5)]).without_background();
        assert_eq!(h.count(0), 0);
        assert_eq!(h.count(7), 5);
        assert_eq!(h.len(), 1);
    }
}
