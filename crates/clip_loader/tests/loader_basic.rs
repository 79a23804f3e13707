//! Shape, labelling and determinism tests for the prefetch pipeline over
//! image-sequence sources.

mod common;
use common::{write_frame_dir, write_source_list};

use anyhow::Result;
use clip_loader::{ClipLoader, ClipLoaderConfig, Phase};
use tempfile::tempdir;

#[test]
fn batches_have_the_declared_shape() -> Result<()> {
    let dir = tempdir()?;
    let a = write_frame_dir(dir.path(), "a", 12, 16, 12)?;
    let b = write_frame_dir(dir.path(), "b", 9, 16, 12)?;
    let c = write_frame_dir(dir.path(), "c", 20, 16, 12)?;
    let list = write_source_list(dir.path(), &[(a.as_path(), 12, 0), (b.as_path(), 9, 1), (c.as_path(), 20, 2)])?;

    let config = ClipLoaderConfig::builder()
        .source(&list)
        .batch_size(2)
        .new_length(4)
        .seed(42)
        .build();
    let mut loader = ClipLoader::new(config)?;

    // Four segments per entry: 2 entries * 4 sub-items per batch.
    assert_eq!(loader.batch_shape(), (8, 3, 4, 12, 16));
    assert_eq!(loader.clip_shape(), (3, 4, 12, 16));

    let batch = loader.next_batch()?;
    assert_eq!(batch.data.dim(), (8, 3, 4, 12, 16));
    assert_eq!(batch.labels.as_ref().unwrap().dim(), (8, 1, 1, 1, 1));
    assert!(batch.data.iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn resize_and_crop_shrink_the_output() -> Result<()> {
    let dir = tempdir()?;
    let a = write_frame_dir(dir.path(), "a", 10, 24, 20)?;
    let list = write_source_list(dir.path(), &[(a.as_path(), 10, 0)])?;

    let config = ClipLoaderConfig::builder()
        .source(&list)
        .batch_size(1)
        .new_length(4)
        .new_height(12)
        .new_width(16)
        .crop_size(8)
        .mirror(true)
        .mean_value(128.0)
        .seed(7)
        .build();
    let mut loader = ClipLoader::new(config)?;

    assert_eq!(loader.batch_shape(), (4, 3, 4, 8, 8));
    let batch = loader.next_batch()?;
    assert_eq!(batch.data.dim(), (4, 3, 4, 8, 8));
    // Mean-centered bytes stay within [-255, 255].
    assert!(batch.data.iter().all(|v| v.abs() <= 255.0));
    Ok(())
}

#[test]
fn pyramid_mode_emits_one_label_per_entry() -> Result<()> {
    let dir = tempdir()?;
    let a = write_frame_dir(dir.path(), "a", 12, 16, 12)?;
    let b = write_frame_dir(dir.path(), "b", 12, 16, 12)?;
    let list = write_source_list(dir.path(), &[(a.as_path(), 12, 5), (b.as_path(), 12, 9)])?;

    let config = ClipLoaderConfig::builder()
        .source(&list)
        .batch_size(2)
        .new_length(4)
        .pyramid_labels(true)
        .seed(42)
        .build();
    let mut loader = ClipLoader::new(config)?;

    let batch = loader.next_batch()?;
    let labels = batch.labels.unwrap();
    assert_eq!(labels.dim(), (2, 1, 1, 1, 1));
    assert_eq!(labels[[0, 0, 0, 0, 0]], 5.0);
    assert_eq!(labels[[1, 0, 0, 0, 0]], 9.0);
    Ok(())
}

#[test]
fn per_item_labels_follow_the_cursor() -> Result<()> {
    let dir = tempdir()?;
    let a = write_frame_dir(dir.path(), "a", 12, 16, 12)?;
    let b = write_frame_dir(dir.path(), "b", 12, 16, 12)?;
    let list = write_source_list(dir.path(), &[(a.as_path(), 12, 5), (b.as_path(), 12, 9)])?;

    let config = ClipLoaderConfig::builder()
        .source(&list)
        .batch_size(2)
        .new_length(4)
        .seed(42)
        .build();
    let mut loader = ClipLoader::new(config)?;

    let batch = loader.next_batch()?;
    let labels = batch.labels.unwrap();
    assert_eq!(labels.dim(), (8, 1, 1, 1, 1));
    for slot in 0..8 {
        let expected = if slot < 4 { 5.0 } else { 9.0 };
        assert_eq!(labels[[slot, 0, 0, 0, 0]], expected);
    }
    Ok(())
}

#[test]
fn labels_can_be_disabled() -> Result<()> {
    let dir = tempdir()?;
    let a = write_frame_dir(dir.path(), "a", 8, 16, 12)?;
    let list = write_source_list(dir.path(), &[(a.as_path(), 8, 0)])?;

    let config = ClipLoaderConfig::builder()
        .source(&list)
        .batch_size(1)
        .new_length(4)
        .with_labels(false)
        .seed(42)
        .build();
    let mut loader = ClipLoader::new(config)?;
    assert!(loader.next_batch()?.labels.is_none());
    Ok(())
}

#[test]
fn the_cursor_wraps_across_batches() -> Result<()> {
    let dir = tempdir()?;
    let a = write_frame_dir(dir.path(), "a", 8, 16, 12)?;
    let b = write_frame_dir(dir.path(), "b", 8, 16, 12)?;
    let c = write_frame_dir(dir.path(), "c", 8, 16, 12)?;
    let list = write_source_list(dir.path(), &[(a.as_path(), 8, 0), (b.as_path(), 8, 1), (c.as_path(), 8, 2)])?;

    let config = ClipLoaderConfig::builder()
        .source(&list)
        .batch_size(2)
        .new_length(4)
        .seed(42)
        .build();
    let mut loader = ClipLoader::new(config)?;

    // Three entries, two consumed per batch: the third batch reuses the
    // front of the list and every batch keeps the declared shape.
    for _ in 0..3 {
        let batch = loader.next_batch()?;
        assert_eq!(batch.data.dim(), (8, 3, 4, 12, 16));
    }
    Ok(())
}

#[test]
fn identical_seeds_reproduce_batches_exactly() -> Result<()> {
    let dir = tempdir()?;
    let a = write_frame_dir(dir.path(), "a", 16, 24, 20)?;
    let b = write_frame_dir(dir.path(), "b", 10, 24, 20)?;
    let c = write_frame_dir(dir.path(), "c", 7, 24, 20)?;
    let list = write_source_list(dir.path(), &[(a.as_path(), 16, 0), (b.as_path(), 10, 1), (c.as_path(), 7, 2)])?;

    let build = || {
        ClipLoaderConfig::builder()
            .source(&list)
            .batch_size(2)
            .new_length(4)
            .new_height(16)
            .new_width(20)
            .crop_size(12)
            .mirror(true)
            .shuffle(true)
            .phase(Phase::Train)
            .seed(1234)
            .build()
    };

    let mut first = ClipLoader::new(build())?;
    let mut second = ClipLoader::new(build())?;
    for _ in 0..3 {
        assert_eq!(first.next_batch()?, second.next_batch()?);
    }
    Ok(())
}
