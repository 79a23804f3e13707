//! src/snapshot.rs
//!
//! Binary tensor snapshots.
//!
//! The on-disk record is five 4-byte little-endian integers — num, channels,
//! length, height, width — followed by `num*channels*length*height*width`
//! scalars in that exact order with no padding, no magic number and no
//! version field. Callers are responsible for matching the scalar width on
//! read. Used for mean files and tensor dumps.

use anyhow::{ensure, Context, Result};
use ndarray::Array5;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Writes `tensor` to `path`. With `record` set, only that record's payload
/// is written and the stored num is forced to 1.
pub fn save_volume(tensor: &Array5<f32>, path: &Path, record: Option<usize>) -> Result<()> {
    let (num, channels, length, height, width) = tensor.dim();
    let record_size = channels * length * height * width;
    let slice = tensor
        .as_slice()
        .context("snapshot save requires a contiguous tensor")?;

    let (out_num, payload) = match record {
        Some(index) => {
            ensure!(
                index < num,
                "record index {} out of range for {} records",
                index,
                num
            );
            (1, &slice[index * record_size..(index + 1) * record_size])
        }
        None => (num, slice),
    };

    let file = File::create(path)
        .with_context(|| format!("failed to create snapshot {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for dim in [out_num, channels, length, height, width] {
        writer.write_all(&(dim as i32).to_le_bytes())?;
    }
    writer.write_all(bytemuck::cast_slice(payload))?;
    writer
        .flush()
        .with_context(|| format!("failed to write snapshot {}", path.display()))
}

/// Loads a snapshot whose payload is f32.
pub fn load_volume(path: &Path) -> Result<Array5<f32>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open snapshot {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let shape = read_header(&mut reader, path)?;
    let count = shape.0 * shape.1 * shape.2 * shape.3 * shape.4;

    let mut bytes = vec![0u8; count * std::mem::size_of::<f32>()];
    reader
        .read_exact(&mut bytes)
        .with_context(|| format!("snapshot {} is truncated", path.display()))?;
    let data: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(Array5::from_shape_vec(shape, data)?)
}

/// Loads a snapshot whose payload is 8-bit unsigned, expanding each sample
/// to f32.
pub fn load_volume_u8(path: &Path) -> Result<Array5<f32>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open snapshot {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let shape = read_header(&mut reader, path)?;
    let count = shape.0 * shape.1 * shape.2 * shape.3 * shape.4;

    let mut bytes = vec![0u8; count];
    reader
        .read_exact(&mut bytes)
        .with_context(|| format!("snapshot {} is truncated", path.display()))?;
    let data: Vec<f32> = bytes.into_iter().map(f32::from).collect();

    Ok(Array5::from_shape_vec(shape, data)?)
}

fn read_header(
    reader: &mut impl Read,
    path: &Path,
) -> Result<(usize, usize, usize, usize, usize)> {
    let mut dims = [0usize; 5];
    for dim in dims.iter_mut() {
        let mut buf = [0u8; 4];
        reader
            .read_exact(&mut buf)
            .with_context(|| format!("snapshot {} has a short header", path.display()))?;
        let value = i32::from_le_bytes(buf);
        ensure!(
            value > 0,
            "snapshot {} declares a non-positive dimension {}",
            path.display(),
            value
        );
        *dim = value as usize;
    }
    Ok((dims[0], dims[1], dims[2], dims[3], dims[4]))
}
