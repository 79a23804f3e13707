//! src/decode/mod.rs
//!
//! Frame decoder adapters.
//!
//! A decoder turns one source entry into a [`VolumeRecord`]: `clip_length`
//! frames, resized when configured, packed channel-major into one contiguous
//! byte buffer. Two variants exist, selected by the configuration's source
//! kind:
//!
//! - image sequences (`image_seq`): numbered frame files read through the
//!   `image` crate, sampled by segment;
//! - video files (`video`, behind the `video` cargo feature): FFmpeg-decoded
//!   frames read sequentially at a fixed stride.
//!
//! Decode errors are per-clip: any unreadable frame aborts the whole clip and
//! the caller decides whether to skip the entry or treat the failure as
//! fatal. Partial decodes are never returned.

pub mod image_seq;
#[cfg(feature = "video")]
pub mod video;

use anyhow::Result;
use rand::rngs::StdRng;

use crate::config::SourceKind;
use crate::source::SourceEntry;
use crate::volume::{VolumeRecord, CLIP_CHANNELS};

/// Decode-time parameters shared by both adapter variants.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    /// Frames per extracted clip.
    pub clip_length: usize,
    /// Resize target; 0 for both keeps the native frame size.
    pub new_height: usize,
    pub new_width: usize,
    /// Frame stride for sequential (video) sampling.
    pub sampling_rate: usize,
}

/// Decodes one clip from `entry`, dispatching on the source kind.
///
/// `segment` and the jitter flag only apply to image sequences; the RNG is
/// consulted for jitter draws and random video start frames.
pub fn read_clip(
    kind: SourceKind,
    entry: &SourceEntry,
    params: &DecodeParams,
    segment: usize,
    jitter: bool,
    rng: &mut StdRng,
) -> Result<VolumeRecord> {
    match kind {
        SourceKind::ImageSequence => {
            image_seq::read_image_sequence(entry, params, segment, jitter, rng)
        }
        #[cfg(feature = "video")]
        SourceKind::Video => video::read_video(entry, params, rng),
        #[cfg(not(feature = "video"))]
        SourceKind::Video => {
            anyhow::bail!("video sources require building with the `video` feature")
        }
    }
}

/// Packs one interleaved RGB frame (row-major `[row][col][channel]`) into the
/// clip buffer's channel-major layout `[channel][frame][row][col]`.
pub(crate) fn pack_rgb_frame(
    buffer: &mut [u8],
    rgb: &[u8],
    frame: usize,
    clip_length: usize,
    height: usize,
    width: usize,
) {
    let image_size = height * width;
    let channel_size = image_size * clip_length;
    let frame_offset = frame * image_size;
    for channel in 0..CLIP_CHANNELS {
        let plane = &mut buffer[channel * channel_size + frame_offset..][..image_size];
        for (pixel, value) in plane.iter_mut().enumerate() {
            *value = rgb[pixel * CLIP_CHANNELS + channel];
        }
    }
}
