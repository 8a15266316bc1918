/// Classification engine: histogram → verdict.
///
/// ```text
///   Cutout ──► Histogram ──► Classifier ──► Classification { verdict, reason, evidence }
///                              │
///                              ├─ ThresholdMajority  (mode share of the box ≥ threshold)
///                              └─ MarginMajority     (non-background mode, min count, margin)
/// ```

pub mod histogram;
pub mod margin;
pub mod threshold;

use serde::Serialize;

use crate::data::model::{Extent, Label};
use crate::error::{CoregError, Result};
use histogram::Histogram;
use margin::MarginMajority;
use threshold::ThresholdMajority;

/// Outcome for one record. Every record gets exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Categorized(Label),
    Uncategorized,
}

impl Verdict {
    pub fn label(&self) -> Option<Label> {
        match self {
            Verdict::Categorized(label) => Some(*label),
            Verdict::Uncategorized => None,
        }
    }

    pub fn is_categorized(&self) -> bool {
        matches!(self, Verdict::Categorized(_))
    }
}

/// Why a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Accepted,
    /// The source returned no voxels at all.
    NoData,
    /// Threshold strategy: background is the most common label.
    BackgroundMode,
    /// Margin strategy: nothing left after removing background.
    BackgroundOnly,
    BelowThreshold,
    BelowMinCount,
    InsufficientMargin,
    /// The cutout could not be fetched.
    SourceUnavailable,
}

/// A verdict plus the numbers it was decided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub reason: Reason,
    /// Label and count of the mode the rule looked at.
    pub mode: Option<(Label, u64)>,
    /// Runner-up count; only the margin strategy computes it.
    pub second_count: Option<u64>,
    /// Voxel count of the sampled box.
    pub total_voxels: u64,
}

impl Classification {
    pub fn accepted(label: Label, count: u64, second_count: Option<u64>, total_voxels: u64) -> Self {
        Classification {
            verdict: Verdict::Categorized(label),
            reason: Reason::Accepted,
            mode: Some((label, count)),
            second_count,
            total_voxels,
        }
    }

    pub fn rejected(
        reason: Reason,
        mode: Option<(Label, u64)>,
        second_count: Option<u64>,
        total_voxels: u64,
    ) -> Self {
        Classification {
            verdict: Verdict::Uncategorized,
            reason,
            mode,
            second_count,
            total_voxels,
        }
    }

    pub fn unavailable(total_voxels: u64) -> Self {
        Self::rejected(Reason::SourceUnavailable, None, None, total_voxels)
    }
}

/// Largest box either rule will sample (1 GiB of labels).
pub const MAX_BOX_VOXELS: u64 = 1 << 27;

fn check_box(box_extent: Extent) -> Result<()> {
    if box_extent.is_degenerate() {
        return Err(CoregError::Config(format!(
            "box extent {box_extent} has a zero dimension"
        )));
    }
    match box_extent.checked_volume() {
        Some(n) if n <= MAX_BOX_VOXELS => Ok(()),
        _ => Err(CoregError::Config(format!(
            "box extent {box_extent} exceeds {MAX_BOX_VOXELS} voxels"
        ))),
    }
}

/// The two interchangeable decision rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classifier {
    Threshold(ThresholdMajority),
    Margin(MarginMajority),
}

impl Classifier {
    /// Extent of the box this rule samples around each point.
    pub fn box_extent(&self) -> Extent {
        match self {
            Classifier::Threshold(c) => c.box_extent(),
            Classifier::Margin(c) => c.box_extent(),
        }
    }

    pub fn classify(&self, histogram: &Histogram) -> Classification {
        match self {
            Classifier::Threshold(c) => c.classify(histogram),
            Classifier::Margin(c) => c.classify(histogram),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Classifier::Threshold(_) => "threshold",
            Classifier::Margin(_) => "margin",
        }
    }
}

impl From<ThresholdMajority> for Classifier {
    fn from(c: ThresholdMajority) -> Self {
        Classifier::Threshold(c)
    }
}

impl From<MarginMajority> for Classifier {
    fn from(c: MarginMajority) -> Self {
        Classifier::Margin(c)
    }
}
