//! src/sampler.rs
//!
//! Temporal clip sampling.
//!
//! Given a source's total frame count `F` and the requested clip length `L`,
//! the sampler computes the ordered list of one-based frame indices to
//! extract. Sources are divided into four candidate temporal windows: three
//! sub-segments laid out over the available range plus the whole range
//! itself, enabling multi-view sampling of the same source.
//!
//! # Segment layout
//!
//! - `F <= L`: every sub-segment equals the full range `[1, F]`.
//! - `L < F < 3L`: three overlapping sub-segments of length `L` with uniform
//!   overlap `offset = L - (3L - F)/2`, together covering `[1, F]`.
//! - `F >= 3L`: three disjoint thirds partitioning `[1, F]`.
//!
//! Segment id 3 always denotes the whole range.
//!
//! # Index selection
//!
//! A segment shorter than (or equal to) `L` is read sequentially from its
//! start and padded by repeating its last frame (clamp-to-edge). A longer
//! segment is resampled across the full range: first index 1, last index
//! `F`, interior indices `round(rate*i + rate/2*jit)` at `rate = F/L`, where
//! `jit` is zero or, with jitter enabled, drawn uniformly from `[-1, 1]` per
//! interior index. Jittered index lists are not necessarily monotonic.

use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::Rng;

/// Segments per source: three sub-ranges plus the whole range.
pub const SEGMENT_COUNT: usize = 4;

/// Id of the whole-range segment.
pub const SEGMENT_WHOLE: usize = 3;

/// The four candidate temporal windows of one source, as one-based inclusive
/// spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    starts: [u32; SEGMENT_COUNT],
    ends: [u32; SEGMENT_COUNT],
}

impl SegmentLayout {
    pub fn new(frame_count: u32, clip_length: u32) -> Result<Self> {
        ensure!(frame_count >= 1, "sources must have at least one frame");
        ensure!(clip_length >= 1, "clip length must be at least one frame");

        let f = frame_count;
        let l = clip_length;
        let mut starts = [1u32; SEGMENT_COUNT];
        let mut ends = [f; SEGMENT_COUNT];

        if f <= l {
            // The only window is the full range.
        } else if f < 3 * l {
            let offset = l - (3 * l - f) / 2;
            starts[0] = 1;
            ends[0] = l;
            starts[1] = starts[0] + offset;
            ends[1] = starts[1] + l - 1;
            starts[2] = starts[1] + offset;
            ends[2] = f;
        } else {
            starts[0] = 1;
            ends[0] = f / 3;
            starts[1] = ends[0] + 1;
            ends[1] = f * 2 / 3;
            starts[2] = ends[1] + 1;
            ends[2] = f;
        }
        starts[SEGMENT_WHOLE] = 1;
        ends[SEGMENT_WHOLE] = f;

        Ok(Self { starts, ends })
    }

    /// One-based inclusive `(start, end)` span of a segment.
    pub fn span(&self, segment: usize) -> (u32, u32) {
        (self.starts[segment], self.ends[segment])
    }

    /// Number of frames a segment covers.
    pub fn span_len(&self, segment: usize) -> u32 {
        self.ends[segment] - self.starts[segment] + 1
    }
}

/// Computes the `clip_length` one-based frame indices to extract for one
/// segment of a source.
///
/// The RNG is only consulted when `jitter` is set; deterministic callers can
/// share the prefetch engine without disturbing reproducibility.
pub fn sample_clip_indices(
    frame_count: u32,
    clip_length: u32,
    segment: usize,
    jitter: bool,
    rng: &mut StdRng,
) -> Result<Vec<u32>> {
    ensure!(
        segment < SEGMENT_COUNT,
        "segment id {} out of range (0..{})",
        segment,
        SEGMENT_COUNT
    );
    let layout = SegmentLayout::new(frame_count, clip_length)?;
    let (start, end) = layout.span(segment);
    let seg_len = layout.span_len(segment);
    let length = clip_length as usize;

    let mut indices = vec![0u32; length];
    if seg_len <= clip_length {
        // Sequential read, clamp-to-edge padding.
        for (i, index) in indices.iter_mut().enumerate().take(seg_len as usize) {
            *index = start + i as u32;
        }
        for index in indices.iter_mut().skip(seg_len as usize) {
            *index = end;
        }
    } else {
        // Resample the full range; endpoints are pinned.
        let rate = frame_count as f64 / clip_length as f64;
        indices[0] = 1;
        indices[length - 1] = frame_count;
        for (i, index) in indices.iter_mut().enumerate().take(length - 1).skip(1) {
            let jit = if jitter {
                rng.random_range(-1.0f64..1.0)
            } else {
                0.0
            };
            let sampled = (rate * i as f64 + rate / 2.0 * jit).round() as i64;
            *index = sampled.max(1) as u32;
        }
    }

    Ok(indices)
}
