//! src/config.rs
//!
//! Configuration surface for the clip pipeline.
//!
//! `ClipLoaderConfig` stores the parameters that control sampling,
//! augmentation and batching. Construct one through the builder:
//!
//! ```ignore
//! let config = ClipLoaderConfig::builder()
//!     .source("train_list.txt")
//!     .batch_size(30)
//!     .new_length(16)
//!     .new_height(128)
//!     .new_width(171)
//!     .crop_size(112)
//!     .mirror(true)
//!     .shuffle(true)
//!     .build();
//! ```
//!
//! Validation happens once, in [`ClipLoader::new`](crate::ClipLoader::new),
//! before any file is touched; invalid combinations are rejected there with a
//! descriptive error rather than silently coerced.

use anyhow::{bail, ensure, Result};
use std::path::PathBuf;

use crate::sampler::SEGMENT_COUNT;

/// Whether batches are being assembled for training or evaluation.
///
/// The phase decides crop placement (random vs. centered), whether mirroring
/// can trigger, and how unreadable clips are handled (skipped vs. fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Test,
}

/// Kind of media behind each source-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A single video file per entry; the entry's second list-file field is
    /// the start frame (`-1` = choose at random).
    Video,
    /// A directory of numbered frames (`000001.jpg`, ...) per entry; the
    /// entry's second list-file field is the available frame count.
    ImageSequence,
}

/// Temporal sampling policy for extracting a clip from a source.
///
/// Video sources pair with `Sequential`; image-sequence sources pair with one
/// of the pyramid policies. Any other combination is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingPolicy {
    /// Fixed-stride window starting at the entry's start frame.
    Sequential,
    /// Three-segment pyramid over the available range plus the whole range;
    /// the segment id cycles per sub-item within a batch.
    Pyramid,
    /// Pyramid sampling with per-index temporal jitter on resampled clips.
    JitteredPyramid,
}

impl SamplingPolicy {
    /// Number of sub-items each source entry expands to within a batch.
    pub fn segment_count(&self) -> usize {
        match self {
            SamplingPolicy::Sequential => 1,
            SamplingPolicy::Pyramid | SamplingPolicy::JitteredPyramid => SEGMENT_COUNT,
        }
    }

    pub fn uses_segments(&self) -> bool {
        !matches!(self, SamplingPolicy::Sequential)
    }

    pub fn jitter(&self) -> bool {
        matches!(self, SamplingPolicy::JitteredPyramid)
    }
}

/// Configuration for [`ClipLoader`](crate::ClipLoader).
#[derive(Debug, Clone)]
pub struct ClipLoaderConfig {
    /// Path to the plain-text source list (`<path> <start_or_count> <label>`
    /// per line).
    pub source: PathBuf,
    /// Number of source entries consumed per batch. The data tensor holds
    /// `batch_size * sampling.segment_count()` clips.
    pub batch_size: usize,
    /// Square crop edge; 0 disables cropping.
    pub crop_size: usize,
    /// Randomly mirror cropped clips in the width dimension (training only).
    /// Requires `crop_size > 0`.
    pub mirror: bool,
    /// Number of frames per extracted clip.
    pub new_length: usize,
    /// Resize decoded frames to this height. Must be set together with
    /// `new_width`; 0 for both keeps the native frame size.
    pub new_height: usize,
    /// Resize decoded frames to this width.
    pub new_width: usize,
    /// Frame stride for sequential (video) sampling.
    pub sampling_rate: usize,
    /// Media kind of every entry in the source list.
    pub source_kind: SourceKind,
    /// Temporal sampling policy; validated against `source_kind`.
    pub sampling: SamplingPolicy,
    /// Emit one label per source entry instead of one per sub-item.
    pub pyramid_labels: bool,
    /// Shuffle the source order at setup and on every wrap-around.
    pub shuffle: bool,
    /// Skip up to this many entries at setup, chosen at random; 0 disables.
    pub rand_skip: usize,
    /// Multiplier applied to every mean-centered value.
    pub scale: f32,
    /// Binary tensor snapshot holding the per-element mean; mutually
    /// exclusive with `mean_value`.
    pub mean_file: Option<PathBuf>,
    /// Constant mean subtracted from every element.
    pub mean_value: Option<f32>,
    /// Training or evaluation behaviour.
    pub phase: Phase,
    /// Whether batches carry a label tensor alongside the data tensor.
    pub with_labels: bool,
    /// Seed for the prefetch RNG (shuffles, crops, mirrors, jitter). A fresh
    /// seed is drawn when unset.
    pub seed: Option<u64>,
}

impl Default for ClipLoaderConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            batch_size: 1,
            crop_size: 0,
            mirror: false,
            new_length: 16,
            new_height: 0,
            new_width: 0,
            sampling_rate: 1,
            source_kind: SourceKind::ImageSequence,
            sampling: SamplingPolicy::Pyramid,
            pyramid_labels: false,
            shuffle: false,
            rand_skip: 0,
            scale: 1.0,
            mean_file: None,
            mean_value: None,
            phase: Phase::Train,
            with_labels: true,
            seed: None,
        }
    }
}

impl ClipLoaderConfig {
    pub fn builder() -> ClipLoaderConfigBuilder {
        ClipLoaderConfigBuilder::default()
    }

    /// Checks every statically-knowable invariant.
    ///
    /// Shape invariants that depend on decoded frames (crop bounds, mean
    /// tensor shape) are checked after the priming decode instead.
    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(
            !self.source.as_os_str().is_empty(),
            "a source list path is required"
        );
        ensure!(self.batch_size > 0, "batch_size must be > 0");
        ensure!(self.new_length > 0, "new_length must be positive");
        ensure!(
            (self.new_height == 0) == (self.new_width == 0),
            "new_height and new_width must be set at the same time \
            (got {}x{})",
            self.new_height,
            self.new_width
        );
        ensure!(
            !self.mirror || self.crop_size > 0,
            "mirror requires crop_size to be set at the same time"
        );
        ensure!(self.sampling_rate >= 1, "sampling_rate must be >= 1");
        ensure!(
            self.scale.is_finite(),
            "scale must be finite, got {}",
            self.scale
        );
        ensure!(
            self.mean_file.is_none() || self.mean_value.is_none(),
            "mean_file and mean_value are mutually exclusive"
        );

        match (self.source_kind, self.sampling) {
            (SourceKind::Video, SamplingPolicy::Sequential) => {}
            (SourceKind::ImageSequence, SamplingPolicy::Pyramid)
            | (SourceKind::ImageSequence, SamplingPolicy::JitteredPyramid) => {}
            (SourceKind::Video, _) => bail!(
                "video sources sample sequentially at a fixed stride; \
                pyramid segment sampling is only available for image sequences"
            ),
            (SourceKind::ImageSequence, SamplingPolicy::Sequential) => bail!(
                "image-sequence sources use pyramid segment sampling; \
                sequential sampling is only available for video sources"
            ),
        }

        if self.pyramid_labels {
            ensure!(
                self.sampling.uses_segments(),
                "pyramid label placement requires segment sampling"
            );
        }

        #[cfg(not(feature = "video"))]
        if matches!(self.source_kind, SourceKind::Video) {
            bail!("video sources require building with the `video` feature");
        }

        Ok(())
    }
}

/// Builder for [`ClipLoaderConfig`] with method chaining.
#[derive(Default)]
pub struct ClipLoaderConfigBuilder {
    config: ClipLoaderConfig,
}

impl ClipLoaderConfigBuilder {
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source = path.into();
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn crop_size(mut self, crop: usize) -> Self {
        self.config.crop_size = crop;
        self
    }

    pub fn mirror(mut self, mirror: bool) -> Self {
        self.config.mirror = mirror;
        self
    }

    pub fn new_length(mut self, length: usize) -> Self {
        self.config.new_length = length;
        self
    }

    pub fn new_height(mut self, height: usize) -> Self {
        self.config.new_height = height;
        self
    }

    pub fn new_width(mut self, width: usize) -> Self {
        self.config.new_width = width;
        self
    }

    pub fn sampling_rate(mut self, rate: usize) -> Self {
        self.config.sampling_rate = rate;
        self
    }

    pub fn source_kind(mut self, kind: SourceKind) -> Self {
        self.config.source_kind = kind;
        self
    }

    pub fn sampling(mut self, policy: SamplingPolicy) -> Self {
        self.config.sampling = policy;
        self
    }

    pub fn pyramid_labels(mut self, pyramid: bool) -> Self {
        self.config.pyramid_labels = pyramid;
        self
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    pub fn rand_skip(mut self, skip: usize) -> Self {
        self.config.rand_skip = skip;
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn mean_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.mean_file = Some(path.into());
        self
    }

    pub fn mean_value(mut self, value: f32) -> Self {
        self.config.mean_value = Some(value);
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.config.phase = phase;
        self
    }

    pub fn with_labels(mut self, with_labels: bool) -> Self {
        self.config.with_labels = with_labels;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn build(self) -> ClipLoaderConfig {
        self.config
    }
}
