//! Assigns segment IDs to points by sampling a segmentation volume around
//! each one and voting over the labels found there.
//!
//! ```text
//!  InputRecord → transform → VolumeSampler → Histogram → Classifier → OutputSinks
//! ```

pub mod classify;
pub mod config;
pub mod data;
pub mod emit;
pub mod error;
pub mod observe;
pub mod pipeline;
pub mod volume;

pub use classify::{Classification, Classifier, Reason, Verdict};
pub use config::Config;
pub use error::CoregError;
pub use pipeline::{Pipeline, PipelineState, RunSummary};
pub use volume::{Cutout, MipStack, RetryingSampler, VolumeSampler};
