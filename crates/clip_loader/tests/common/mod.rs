//! Shared fixtures for the loader integration tests: numbered frame
//! directories and source list files.

#![allow(dead_code)]

use anyhow::Result;
use image::{Rgb, RgbImage};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Writes `frames` numbered JPEG frames (`000001.jpg`, ...) of a flat color
/// derived from the frame number, and returns the sequence directory.
pub fn write_frame_dir(
    root: &Path,
    name: &str,
    frames: u32,
    width: u32,
    height: u32,
) -> Result<PathBuf> {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir)?;
    for frame_no in 1..=frames {
        let mut img = RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([(frame_no * 20 % 256) as u8, 64, 128]);
        }
        img.save(dir.join(format!("{frame_no:06}.jpg")))?;
    }
    Ok(dir)
}

/// Writes a source list of `(path, frame_count, label)` tuples.
pub fn write_source_list(root: &Path, entries: &[(&Path, u32, i32)]) -> Result<PathBuf> {
    let mut contents = String::new();
    for (path, frames, label) in entries {
        writeln!(contents, "{} {} {}", path.display(), frames, label)?;
    }
    let list = root.join("sources.txt");
    std::fs::write(&list, contents)?;
    Ok(list)
}
