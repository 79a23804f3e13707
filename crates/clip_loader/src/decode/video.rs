//! src/decode/video.rs
//!
//! Video-backed decoder (FFmpeg). Frames are read sequentially at the
//! configured stride from a start frame; when the source entry requests a
//! random start (`-1` in the list file), one is drawn so that the whole
//! sampled window fits.

use anyhow::{anyhow, ensure, Context, Result};
use ffmpeg_next as ffmpeg;
use rand::rngs::StdRng;
use rand::Rng;

use super::{pack_rgb_frame, DecodeParams};
use crate::source::SourceEntry;
use crate::volume::{VolumeRecord, CLIP_CHANNELS};

/// Decodes one clip from a video file.
///
/// Fails when the file cannot be opened, when fewer than
/// `clip_length * sampling_rate` frames are available, or when any sampled
/// frame cannot be decoded; the caller skips the entry or treats the failure
/// as fatal.
pub fn read_video(
    entry: &SourceEntry,
    params: &DecodeParams,
    rng: &mut StdRng,
) -> Result<VolumeRecord> {
    ffmpeg::init().map_err(|e| anyhow!("failed to initialize ffmpeg: {e}"))?;

    let mut ictx = ffmpeg::format::input(&entry.path)
        .with_context(|| format!("cannot open {}", entry.path.display()))?;
    let stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .with_context(|| format!("no video stream in {}", entry.path.display()))?;
    let stream_index = stream.index();

    let frame_count = count_frames(&stream);
    let window = params.clip_length * params.sampling_rate;
    ensure!(
        frame_count >= window,
        "not enough frames in {}; having {}",
        entry.path.display(),
        frame_count
    );

    let start = match entry.start_frame() {
        Some(start) => start as usize,
        None => rng.random_range(0..=frame_count - window),
    };
    ensure!(
        start + window <= frame_count,
        "start frame {} leaves no room for {} frames at stride {} in {}",
        start,
        params.clip_length,
        params.sampling_rate,
        entry.path.display()
    );

    let mut decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .context("failed to create codec context")?
        .decoder()
        .video()
        .context("failed to create video decoder")?;

    let out_width = if params.new_width > 0 {
        params.new_width as u32
    } else {
        decoder.width()
    };
    let out_height = if params.new_height > 0 {
        params.new_height as u32
    } else {
        decoder.height()
    };

    let mut collector = FrameCollector {
        buffer: vec![0u8; CLIP_CHANNELS * params.clip_length * (out_height * out_width) as usize],
        clip_length: params.clip_length,
        height: out_height as usize,
        width: out_width as usize,
        start,
        stride: params.sampling_rate,
        next_index: 0,
        collected: 0,
        scaler: None,
    };

    // Decode sequentially; the collector picks out the sampled indices and
    // lets us stop as soon as the window is complete.
    for (stream_ref, packet) in ictx.packets() {
        if stream_ref.index() != stream_index {
            continue;
        }
        decoder
            .send_packet(&packet)
            .with_context(|| format!("decode error in {}", entry.path.display()))?;
        collector.drain(&mut decoder)?;
        if collector.is_complete() {
            break;
        }
    }
    if !collector.is_complete() {
        decoder.send_eof().ok();
        collector.drain(&mut decoder)?;
    }

    ensure!(
        collector.is_complete(),
        "no data past frame {} in {}",
        collector.next_index,
        entry.path.display()
    );

    VolumeRecord::from_bytes(
        params.clip_length,
        out_height as usize,
        out_width as usize,
        entry.label,
        collector.buffer,
    )
}

/// Frame total for the stream, falling back to a duration-based estimate
/// when the container does not carry a count.
fn count_frames(stream: &ffmpeg::format::stream::Stream) -> usize {
    let declared = stream.frames();
    if declared > 0 {
        return declared as usize;
    }
    let fps = f64::from(stream.avg_frame_rate());
    let duration = stream.duration() as f64 * f64::from(stream.time_base());
    if fps > 0.0 && duration > 0.0 {
        (fps * duration).floor() as usize
    } else {
        0
    }
}

struct FrameCollector {
    buffer: Vec<u8>,
    clip_length: usize,
    height: usize,
    width: usize,
    start: usize,
    stride: usize,
    next_index: usize,
    collected: usize,
    scaler: Option<ffmpeg::software::scaling::Context>,
}

impl FrameCollector {
    fn is_complete(&self) -> bool {
        self.collected == self.clip_length
    }

    /// Receives every frame the decoder has ready, packing the ones that fall
    /// on the sampled grid.
    fn drain(&mut self, decoder: &mut ffmpeg::decoder::Video) -> Result<()> {
        let mut frame = ffmpeg::util::frame::video::Video::empty();
        while decoder.receive_frame(&mut frame).is_ok() {
            let index = self.next_index;
            self.next_index += 1;
            if self.is_complete()
                || index < self.start
                || (index - self.start) % self.stride != 0
            {
                continue;
            }
            self.pack(&frame)?;
        }
        Ok(())
    }

    fn pack(&mut self, frame: &ffmpeg::util::frame::video::Video) -> Result<()> {
        if self.scaler.is_none() {
            self.scaler = Some(
                ffmpeg::software::scaling::Context::get(
                    frame.format(),
                    frame.width(),
                    frame.height(),
                    ffmpeg::format::Pixel::RGB24,
                    self.width as u32,
                    self.height as u32,
                    ffmpeg::software::scaling::Flags::BILINEAR,
                )
                .context("failed to create pixel format scaler")?,
            );
        }

        let mut rgb = ffmpeg::util::frame::video::Video::empty();
        self.scaler
            .as_mut()
            .ok_or_else(|| anyhow!("scaler missing"))?
            .run(frame, &mut rgb)
            .context("pixel format conversion failed")?;

        // The scaler output carries per-row padding; copy rows tightly.
        let data = rgb.data(0);
        let row_stride = rgb.stride(0);
        let row_bytes = self.width * CLIP_CHANNELS;
        let mut tight = Vec::with_capacity(self.height * row_bytes);
        for row in 0..self.height {
            let offset = row * row_stride;
            ensure!(
                offset + row_bytes <= data.len(),
                "decoded frame is shorter than its declared {}x{} size",
                self.width,
                self.height
            );
            tight.extend_from_slice(&data[offset..offset + row_bytes]);
        }

        pack_rgb_frame(
            &mut self.buffer,
            &tight,
            self.collected,
            self.clip_length,
            self.height,
            self.width,
        );
        self.collected += 1;
        Ok(())
    }
}
