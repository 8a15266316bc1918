//! Volume sources: the `VolumeSampler` seam and its in-memory implementations.
//!
//! A sampler answers one question: which labels fill the box of a given extent
//! centered on a sampling-frame coordinate at a given mip level. Regions the
//! source has no data for come back as background (`0`) voxels.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::data::model::{BACKGROUND, Extent, Label, SamplingCoordinate, Vec3};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    /// A fetch failed in a way that may succeed on retry.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("mip level {0} is not available")]
    MissingLevel(u32),

    #[error("invalid volume: {0}")]
    InvalidVolume(String),
}

impl SamplerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SamplerError::Transient(_))
    }
}

// ---------------------------------------------------------------------------
// Cutout
// ---------------------------------------------------------------------------

/// Dense block of labels, x-fastest, whose shape equals the requested extent.
///
/// A source that explicitly reports "no data" yields a cutout with no voxels
/// at all, which histograms to an empty mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cutout {
    extent: Extent,
    voxels: Vec<Label>,
}

impl Cutout {
    pub fn new(extent: Extent, voxels: Vec<Label>) -> Result<Self, SamplerError> {
        if voxels.len() as u64 != extent.volume() {
            return Err(SamplerError::InvalidVolume(format!(
                "cutout of extent {extent} needs {} voxels, got {}",
                extent.volume(),
                voxels.len()
            )));
        }
        Ok(Cutout { extent, voxels })
    }

    pub fn no_data(extent: Extent) -> Self {
        Cutout {
            extent,
            voxels: Vec::new(),
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn voxels(&self) -> &[Label] {
        &self.voxels
    }
}

// ---------------------------------------------------------------------------
// VolumeSampler trait
// ---------------------------------------------------------------------------

/// Source of label cutouts. Implementations must be shareable across the
/// worker pool.
pub trait VolumeSampler: Send + Sync {
    fn sample(
        &self,
        center: SamplingCoordinate,
        extent: Extent,
        level: u32,
    ) -> Result<Cutout, SamplerError>;
}

impl<S: VolumeSampler + ?Sized> VolumeSampler for &S {
    fn sample(
        &self,
        center: SamplingCoordinate,
        extent: Extent,
        level: u32,
    ) -> Result<Cutout, SamplerError> {
        (**self).sample(center, extent, level)
    }
}

impl<S: VolumeSampler + ?Sized> VolumeSampler for Box<S> {
    fn sample(
        &self,
        center: SamplingCoordinate,
        extent: Extent,
        level: u32,
    ) -> Result<Cutout, SamplerError> {
        (**self).sample(center, extent, level)
    }
}

/// Corner of the box of `extent` centered on `center`: `center - extent / 2`.
pub fn box_origin(center: Vec3, extent: Extent) -> Vec3 {
    Vec3::new(
        center.x - (extent.dx / 2) as i64,
        center.y - (extent.dy / 2) as i64,
        center.z - (extent.dz / 2) as i64,
    )
}

// ---------------------------------------------------------------------------
// LabelVolume – one resolution level held in memory
// ---------------------------------------------------------------------------

/// A dense label block positioned at `voxel_offset` in its level's frame.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    voxel_offset: Vec3,
    size: Extent,
    data: Vec<Label>,
}

impl LabelVolume {
    pub fn new(voxel_offset: Vec3, size: Extent, data: Vec<Label>) -> Result<Self, SamplerError> {
        if data.len() as u64 != size.volume() {
            return Err(SamplerError::InvalidVolume(format!(
                "size {size} needs {} labels, got {}",
                size.volume(),
                data.len()
            )));
        }
        Ok(LabelVolume {
            voxel_offset,
            size,
            data,
        })
    }

    pub fn size(&self) -> Extent {
        self.size
    }

    pub fn voxel_offset(&self) -> Vec3 {
        self.voxel_offset
    }

    /// Label at a level-frame coordinate; background outside the block.
    pub fn get(&self, p: Vec3) -> Label {
        let local = (
            p.x - self.voxel_offset.x,
            p.y - self.voxel_offset.y,
            p.z - self.voxel_offset.z,
        );
        if local.0 < 0 || local.1 < 0 || local.2 < 0 {
            return BACKGROUND;
        }
        let (x, y, z) = (local.0 as usize, local.1 as usize, local.2 as usize);
        if x >= self.size.dx || y >= self.size.dy || z >= self.size.dz {
            return BACKGROUND;
        }
        self.data[x + self.size.dx * (y + self.size.dy * z)]
    }

    /// Copy out the box of `extent` centered on `center`, padding with background.
    pub fn cutout(&self, center: Vec3, extent: Extent) -> Cutout {
        let origin = box_origin(center, extent);
        let mut voxels = Vec::with_capacity(extent.volume() as usize);
        for dz in 0..extent.dz as i64 {
            for dy in 0..extent.dy as i64 {
                for dx in 0..extent.dx as i64 {
                    voxels.push(self.get(Vec3::new(origin.x + dx, origin.y + dy, origin.z + dz)));
                }
            }
        }
        Cutout { extent, voxels }
    }
}

// ---------------------------------------------------------------------------
// MipStack – one LabelVolume per resolution level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MipStack {
    levels: BTreeMap<u32, LabelVolume>,
}

impl MipStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a level, returning the volume it replaced.
    pub fn insert(&mut self, mip: u32, volume: LabelVolume) -> Option<LabelVolume> {
        self.levels.insert(mip, volume)
    }

    pub fn with_level(mut self, mip: u32, volume: LabelVolume) -> Self {
        self.levels.insert(mip, volume);
        self
    }

    pub fn levels(&self) -> impl Iterator<Item = u32> + '_ {
        self.levels.keys().copied()
    }
}

impl VolumeSampler for MipStack {
    fn sample(
        &self,
        center: SamplingCoordinate,
        extent: Extent,
        level: u32,
    ) -> Result<Cutout, SamplerError> {
        let volume = self
            .levels
            .get(&level)
            .ok_or(SamplerError::MissingLevel(level))?;
        Ok(volume.cutout(center.0, extent))
    }
}

// ---------------------------------------------------------------------------
// RetryingSampler – bounded retry with exponential backoff
// ---------------------------------------------------------------------------

/// Retries transient failures of the wrapped sampler.
///
/// Attempt `n` (0-based) that fails transiently sleeps `backoff * 2^n` before
/// the next one; after `max_retries` retries the last error is returned.
/// Permanent errors are returned immediately.
pub struct RetryingSampler<S> {
    inner: S,
    max_retries: u32,
    backoff: Duration,
}

impl<S: VolumeSampler> RetryingSampler<S> {
    pub fn new(inner: S, max_retries: u32, backoff: Duration) -> Self {
        RetryingSampler {
            inner,
            max_retries,
            backoff,
        }
    }
}

impl<S: VolumeSampler> VolumeSampler for RetryingSampler<S> {
    fn sample(
        &self,
        center: SamplingCoordinate,
        extent: Extent,
        level: u32,
    ) -> Result<Cutout, SamplerError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.sample(center, extent, level) {
                Ok(cutout) => return Ok(cutout),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff.saturating_mul(1u32 << attempt.min(16));
                    log::debug!(
                        "cutout at {center} failed ({e}), retry {} of {} in {delay:?}",
                        attempt + 1,
                        self.max_retries
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
