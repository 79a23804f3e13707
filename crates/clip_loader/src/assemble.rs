//! src/assemble.rs
//!
//! Batch assembly: copies one decoded clip into its slot of the batch
//! tensor, applying cropping, mirroring, mean-centering and scaling.
//!
//! Crop offsets are randomized for training batches and centered otherwise;
//! the mirror coin flip only triggers during training. Every copied scalar
//! is transformed as `(value - mean[source_index]) * scale`, where the mean
//! is indexed in the uncropped source layout.

use anyhow::{ensure, Context, Result};
use ndarray::Array5;
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::Phase;
use crate::volume::{VolumePayload, VolumeRecord};

/// Augmentation parameters shared by every sub-item of a batch.
#[derive(Debug, Clone, Copy)]
pub struct AssembleParams {
    /// Square crop edge; 0 disables cropping.
    pub crop_size: usize,
    /// Mirror cropped clips in the width dimension on a coin flip.
    pub mirror: bool,
    /// Multiplier applied after mean-centering.
    pub scale: f32,
    pub phase: Phase,
}

/// Copies `record` into slot `slot` of `batch`, augmenting per `params`.
///
/// The record must match the shape the batch was allocated for; a mismatch
/// (e.g. a source whose native size differs from the priming clip) is an
/// error, never a truncated copy.
pub fn assemble_clip(
    batch: &mut Array5<f32>,
    slot: usize,
    record: &VolumeRecord,
    mean: &Array5<f32>,
    params: &AssembleParams,
    rng: &mut StdRng,
) -> Result<()> {
    let (slots, channels, length, out_height, out_width) = batch.dim();
    ensure!(slot < slots, "slot {} out of range ({} slots)", slot, slots);
    ensure!(
        channels == record.channels && length == record.length,
        "record shape ({}, {}, {}, {}) does not match batch item shape \
        ({}, {}, {}, {})",
        record.channels,
        record.length,
        record.height,
        record.width,
        channels,
        length,
        out_height,
        out_width
    );

    let mean_slice = mean
        .as_slice()
        .context("mean tensor must be contiguous")?;
    ensure!(
        mean_slice.len() == record.element_count(),
        "mean tensor holds {} elements, decoded record holds {}",
        mean_slice.len(),
        record.element_count()
    );

    let item_size = channels * length * out_height * out_width;
    let batch_slice = batch
        .as_slice_mut()
        .context("batch tensor must be contiguous")?;
    let item = &mut batch_slice[slot * item_size..(slot + 1) * item_size];

    if params.crop_size > 0 {
        let crop = params.crop_size;
        ensure!(
            out_height == crop && out_width == crop,
            "batch was allocated for {}x{} items but crop_size is {}",
            out_height,
            out_width,
            crop
        );
        ensure!(
            record.height >= crop && record.width >= crop,
            "cannot crop {} from a {}x{} record",
            crop,
            record.height,
            record.width
        );
        let data = record
            .bytes()
            .context("clip cropping only supports byte-valued records")?;

        let (h_off, w_off) = crop_offsets(record.height, record.width, crop, params.phase, rng);
        let mirrored =
            params.mirror && params.phase == Phase::Train && rng.random_bool(0.5);
        copy_cropped(
            item,
            data,
            mean_slice,
            (channels, length, record.height, record.width),
            crop,
            h_off,
            w_off,
            mirrored,
            params.scale,
        );
    } else {
        ensure!(
            out_height == record.height && out_width == record.width,
            "record is {}x{} but the batch was allocated for {}x{}",
            record.height,
            record.width,
            out_height,
            out_width
        );
        match &record.payload {
            VolumePayload::Bytes(data) => {
                for (j, value) in data.iter().enumerate() {
                    item[j] = (*value as f32 - mean_slice[j]) * params.scale;
                }
            }
            VolumePayload::Floats(data) => {
                for (j, value) in data.iter().enumerate() {
                    item[j] = (value - mean_slice[j]) * params.scale;
                }
            }
        }
    }

    Ok(())
}

/// Writes the record's label into the label tensor: one label per sub-item,
/// or one per source entry (at the floor-division index) in pyramid mode.
pub fn place_label(
    labels: &mut Array5<f32>,
    slot: usize,
    segment_count: usize,
    pyramid: bool,
    label: i32,
) {
    let index = if pyramid { slot / segment_count } else { slot };
    labels[[index, 0, 0, 0, 0]] = label as f32;
}

/// Crop offsets: random within the slack for training, centered otherwise.
/// At zero slack (record edge equals the crop edge) the offset is always 0.
fn crop_offsets(
    height: usize,
    width: usize,
    crop: usize,
    phase: Phase,
    rng: &mut StdRng,
) -> (usize, usize) {
    let h_slack = height - crop;
    let w_slack = width - crop;
    match phase {
        Phase::Train => (
            if h_slack > 0 {
                rng.random_range(0..h_slack)
            } else {
                0
            },
            if w_slack > 0 {
                rng.random_range(0..w_slack)
            } else {
                0
            },
        ),
        Phase::Test => (h_slack / 2, w_slack / 2),
    }
}

#[allow(clippy::too_many_arguments)]
fn copy_cropped(
    out: &mut [f32],
    data: &[u8],
    mean: &[f32],
    (channels, length, height, width): (usize, usize, usize, usize),
    crop: usize,
    h_off: usize,
    w_off: usize,
    mirrored: bool,
    scale: f32,
) {
    for c in 0..channels {
        for l in 0..length {
            for h in 0..crop {
                for w in 0..crop {
                    let out_w = if mirrored { crop - 1 - w } else { w };
                    let out_index = (((c * length + l) * crop) + h) * crop + out_w;
                    let src_index =
                        ((c * length + l) * height + h + h_off) * width + w + w_off;
                    out[out_index] = (data[src_index] as f32 - mean[src_index]) * scale;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn record_2x4x4(label: i32) -> VolumeRecord {
        // channels=3, length=2, 4x4 frames; payload value encodes its index.
        let data: Vec<u8> = (0..3 * 2 * 4 * 4).map(|i| i as u8).collect();
        VolumeRecord::from_bytes(2, 4, 4, label, data).unwrap()
    }

    fn zero_mean(elements: usize) -> Array5<f32> {
        Array5::from_shape_vec((1, 3, 2, 4, 4), vec![0.0; elements]).unwrap()
    }

    #[test]
    fn full_copy_applies_mean_and_scale() -> Result<()> {
        let record = record_2x4x4(0);
        let mut mean = zero_mean(record.element_count());
        mean.fill(1.0);
        let mut batch = Array5::zeros((1, 3, 2, 4, 4));

        let params = AssembleParams {
            crop_size: 0,
            mirror: false,
            scale: 2.0,
            phase: Phase::Train,
        };
        assemble_clip(&mut batch, 0, &record, &mean, &params, &mut rng())?;

        let flat = batch.as_slice().unwrap();
        for (j, &value) in flat.iter().enumerate() {
            assert_eq!(value, (j as f32 - 1.0) * 2.0);
        }
        Ok(())
    }

    #[test]
    fn float_fallback_path_copies_without_bytes() -> Result<()> {
        let data: Vec<f32> = (0..3 * 2 * 4 * 4).map(|i| i as f32 * 0.5).collect();
        let record = VolumeRecord::from_floats(2, 4, 4, 0, data).unwrap();
        let mean = zero_mean(record.element_count());
        let mut batch = Array5::zeros((1, 3, 2, 4, 4));

        let params = AssembleParams {
            crop_size: 0,
            mirror: false,
            scale: 1.0,
            phase: Phase::Test,
        };
        assemble_clip(&mut batch, 0, &record, &mean, &params, &mut rng())?;
        assert_eq!(batch[[0, 0, 0, 0, 1]], 0.5);
        assert_eq!(batch[[0, 2, 1, 3, 3]], (3 * 2 * 4 * 4 - 1) as f32 * 0.5);
        Ok(())
    }

    #[test]
    fn cropping_rejects_float_records() {
        let data = vec![0.0f32; 3 * 2 * 4 * 4];
        let record = VolumeRecord::from_floats(2, 4, 4, 0, data).unwrap();
        let mean = zero_mean(record.element_count());
        let mut batch = Array5::zeros((1, 3, 2, 2, 2));

        let params = AssembleParams {
            crop_size: 2,
            mirror: false,
            scale: 1.0,
            phase: Phase::Train,
        };
        assert!(assemble_clip(&mut batch, 0, &record, &mean, &params, &mut rng()).is_err());
    }

    #[test]
    fn test_phase_centers_the_crop() -> Result<()> {
        let record = record_2x4x4(0);
        let mean = zero_mean(record.element_count());
        let mut batch = Array5::zeros((1, 3, 2, 2, 2));

        let params = AssembleParams {
            crop_size: 2,
            mirror: false,
            scale: 1.0,
            phase: Phase::Test,
        };
        assemble_clip(&mut batch, 0, &record, &mean, &params, &mut rng())?;

        // Centered offsets: h_off = w_off = (4-2)/2 = 1. First output value is
        // source (c=0, l=0, h=1, w=1) = index 5.
        assert_eq!(batch[[0, 0, 0, 0, 0]], 5.0);
        assert_eq!(batch[[0, 0, 0, 0, 1]], 6.0);
        assert_eq!(batch[[0, 0, 0, 1, 0]], 9.0);
        Ok(())
    }

    #[test]
    fn train_crop_offsets_stay_in_bounds() {
        let mut rng = rng();
        for _ in 0..200 {
            let (h_off, w_off) = crop_offsets(16, 12, 8, Phase::Train, &mut rng);
            assert!(h_off <= 16 - 8);
            assert!(w_off <= 12 - 8);
        }
        // Zero slack always yields offset 0.
        assert_eq!(crop_offsets(8, 8, 8, Phase::Train, &mut rng), (0, 0));
        assert_eq!(crop_offsets(8, 8, 8, Phase::Test, &mut rng), (0, 0));
    }

    #[test]
    fn mirrored_rows_reverse_and_double_mirror_restores() {
        let record = record_2x4x4(0);
        let data = record.bytes().unwrap();
        let mean = vec![0.0f32; record.element_count()];
        let dims = (3, 2, 4, 4);
        let crop = 2;

        let mut natural = vec![0.0f32; 3 * 2 * crop * crop];
        let mut mirrored = vec![0.0f32; 3 * 2 * crop * crop];
        copy_cropped(&mut natural, data, &mean, dims, crop, 1, 1, false, 1.0);
        copy_cropped(&mut mirrored, data, &mean, dims, crop, 1, 1, true, 1.0);

        // Each output row of the mirrored copy is the natural row reversed.
        for row in natural.chunks(crop).zip(mirrored.chunks(crop)) {
            let reversed: Vec<f32> = row.1.iter().rev().copied().collect();
            assert_eq!(row.0, reversed.as_slice());
        }

        // Reversing the mirrored rows again restores the natural order.
        let restored: Vec<f32> = mirrored
            .chunks(crop)
            .flat_map(|row| row.iter().rev().copied().collect::<Vec<_>>())
            .collect();
        assert_eq!(natural, restored);
    }

    #[test]
    fn rejects_shape_mismatch_against_the_batch() {
        let record = record_2x4x4(0);
        let mean = zero_mean(record.element_count());
        // Batch allocated for 3x3 items; record frames are 4x4.
        let mut batch = Array5::zeros((1, 3, 2, 3, 3));
        let params = AssembleParams {
            crop_size: 0,
            mirror: false,
            scale: 1.0,
            phase: Phase::Train,
        };
        assert!(assemble_clip(&mut batch, 0, &record, &mean, &params, &mut rng()).is_err());
    }

    #[test]
    fn pyramid_labels_collapse_per_entry() {
        let mut labels = Array5::zeros((2, 1, 1, 1, 1));
        for slot in 0..8 {
            place_label(&mut labels, slot, 4, true, (slot / 4) as i32 + 10);
        }
        assert_eq!(labels[[0, 0, 0, 0, 0]], 10.0);
        assert_eq!(labels[[1, 0, 0, 0, 0]], 11.0);

        let mut labels = Array5::zeros((4, 1, 1, 1, 1));
        for slot in 0..4 {
            place_label(&mut labels, slot, 4, false, slot as i32);
        }
        assert_eq!(labels[[3, 0, 0, 0, 0]], 3.0);
    }
}
