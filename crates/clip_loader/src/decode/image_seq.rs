//! src/decode/image_seq.rs
//!
//! Image-sequence decoder: reads `clip_length` individually numbered frame
//! files (`000001.jpg`, one-based, zero-padded to six digits) from an entry's
//! directory, following the clip sampler's index list.

use anyhow::{ensure, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::rngs::StdRng;

use super::{pack_rgb_frame, DecodeParams};
use crate::sampler::sample_clip_indices;
use crate::source::SourceEntry;
use crate::volume::{VolumeRecord, CLIP_CHANNELS};

/// Decodes one clip from a directory of numbered frames.
///
/// The record's height/width are taken from the first decoded frame; a later
/// frame with different dimensions is an error rather than a silent miscopy.
/// Any missing or undecodable frame aborts the whole clip.
pub fn read_image_sequence(
    entry: &SourceEntry,
    params: &DecodeParams,
    segment: usize,
    jitter: bool,
    rng: &mut StdRng,
) -> Result<VolumeRecord> {
    let frame_count = entry.frame_count()?;
    let indices = sample_clip_indices(
        frame_count,
        params.clip_length as u32,
        segment,
        jitter,
        rng,
    )?;

    let clip_length = params.clip_length;
    let mut buffer = Vec::new();
    let mut height = 0usize;
    let mut width = 0usize;

    for (frame, &frame_no) in indices.iter().enumerate() {
        let path = entry.path.join(format!("{frame_no:06}.jpg"));
        let rgb = load_frame(&path, params)?;

        if frame == 0 {
            height = rgb.height() as usize;
            width = rgb.width() as usize;
            buffer = vec![0u8; CLIP_CHANNELS * clip_length * height * width];
        } else {
            ensure!(
                rgb.height() as usize == height && rgb.width() as usize == width,
                "frame {} is {}x{} but the clip started at {}x{}",
                path.display(),
                rgb.width(),
                rgb.height(),
                width,
                height
            );
        }
        pack_rgb_frame(&mut buffer, rgb.as_raw(), frame, clip_length, height, width);
    }

    VolumeRecord::from_bytes(clip_length, height, width, entry.label, buffer)
}

fn load_frame(path: &std::path::Path, params: &DecodeParams) -> Result<RgbImage> {
    let img = image::open(path)
        .with_context(|| format!("could not open or find frame {}", path.display()))?
        .to_rgb8();
    if params.new_height > 0 && params.new_width > 0 {
        Ok(imageops::resize(
            &img,
            params.new_width as u32,
            params.new_height as u32,
            FilterType::Triangle,
        ))
    } else {
        Ok(img)
    }
}
