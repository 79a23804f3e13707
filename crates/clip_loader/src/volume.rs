//! src/volume.rs
//!
//! The decoded-clip record: the unit of transfer between frame decoding and
//! batch assembly. Created fresh per clip, consumed immediately, never
//! retained.

use anyhow::{ensure, Result};

/// Fixed channel depth of every decoded clip (RGB).
pub const CLIP_CHANNELS: usize = 3;

/// Raw payload of a decoded clip, channel-major `[channel][frame][row][col]`.
///
/// Decoders emit 8-bit samples; the float variant exists as the fallback
/// representation for records produced elsewhere (e.g. loaded dumps) and is
/// not croppable.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumePayload {
    Bytes(Vec<u8>),
    Floats(Vec<f32>),
}

/// One decoded clip: shape metadata, its label, and the raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRecord {
    pub channels: usize,
    pub length: usize,
    pub height: usize,
    pub width: usize,
    pub label: i32,
    pub payload: VolumePayload,
}

impl VolumeRecord {
    pub fn from_bytes(
        length: usize,
        height: usize,
        width: usize,
        label: i32,
        data: Vec<u8>,
    ) -> Result<Self> {
        let expected = CLIP_CHANNELS * length * height * width;
        ensure!(
            data.len() == expected,
            "payload holds {} bytes, shape ({}, {}, {}, {}) needs {}",
            data.len(),
            CLIP_CHANNELS,
            length,
            height,
            width,
            expected
        );
        Ok(Self {
            channels: CLIP_CHANNELS,
            length,
            height,
            width,
            label,
            payload: VolumePayload::Bytes(data),
        })
    }

    pub fn from_floats(
        length: usize,
        height: usize,
        width: usize,
        label: i32,
        data: Vec<f32>,
    ) -> Result<Self> {
        let expected = CLIP_CHANNELS * length * height * width;
        ensure!(
            data.len() == expected,
            "payload holds {} floats, shape ({}, {}, {}, {}) needs {}",
            data.len(),
            CLIP_CHANNELS,
            length,
            height,
            width,
            expected
        );
        Ok(Self {
            channels: CLIP_CHANNELS,
            length,
            height,
            width,
            label,
            payload: VolumePayload::Floats(data),
        })
    }

    /// Total scalar count, `channels * length * height * width`.
    pub fn element_count(&self) -> usize {
        self.channels * self.length * self.height * self.width
    }

    /// Byte payload, when the record is byte-valued.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            VolumePayload::Bytes(data) => Some(data),
            VolumePayload::Floats(_) => None,
        }
    }
}
