//! End-to-end checks over a synthetic `<root>/<tile>/{images,masks}` tree.

use burn_dataset::{
    enumerate_samples, summarize_layout, BatchConfig, BatchIter, TileDataset, TileLayout,
};
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::fs;
use std::path::Path;

type B = burn_ndarray::NdArray<f32>;

/// Write `count` JPEG tiles and matching PNG masks into `<root>/<tile>`.
/// Masks are foreground (255) on the left half, background (0) on the right.
fn write_tile(root: &Path, tile: u32, count: usize, size: u32) -> anyhow::Result<()> {
    let images = root.join(tile.to_string()).join("images");
    let masks = root.join(tile.to_string()).join("masks");
    fs::create_dir_all(&images)?;
    fs::create_dir_all(&masks)?;
    for i in 0..count {
        let name = format!("tile_{tile}_{i:03}");
        RgbImage::from_pixel(size, size, Rgb([200, 40, 40])).save(images.join(format!("{name}.jpg")))?;
        GrayImage::from_fn(size, size, |x, _| if x < size / 2 { Luma([255]) } else { Luma([0]) })
            .save(masks.join(format!("{name}.png")))?;
    }
    Ok(())
}

#[test]
fn enumerates_one_record_per_image_across_tiles() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tile(tmp.path(), 0, 2, 8)?;
    write_tile(tmp.path(), 1, 3, 8)?;
    write_tile(tmp.path(), 2, 1, 8)?;

    let samples = enumerate_samples(tmp.path(), TileLayout::default())?;
    assert_eq!(samples.len(), 6);
    for s in &samples {
        let expected = s
            .image
            .to_string_lossy()
            .replace("/images/", "/masks/")
            .replace(".jpg", ".png");
        assert_eq!(s.mask.to_string_lossy(), expected);
    }
    assert_eq!(samples.first().map(|s| s.tile), Some(0));

    let skipped = enumerate_samples(
        tmp.path(),
        TileLayout {
            skip_first_tile: true,
        },
    )?;
    assert_eq!(skipped.len(), 4);
    assert!(skipped.iter().all(|s| s.tile != 0));
    Ok(())
}

#[test]
fn enumerator_does_not_require_masks() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tile(tmp.path(), 1, 2, 4)?;
    let orphan_dir = tmp.path().join("1").join("images");
    RgbImage::new(4, 4).save(orphan_dir.join("orphan.jpg"))?;

    let samples = enumerate_samples(tmp.path(), TileLayout::default())?;
    assert_eq!(samples.len(), 3);
    let summary = summarize_layout(&samples);
    assert_eq!(summary.missing_masks.len(), 1);
    assert!(summary.missing_masks[0].ends_with("1/masks/orphan.png"));
    Ok(())
}

#[test]
fn dataset_access_is_stable_and_labels_are_binary() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tile(tmp.path(), 1, 2, 16)?;
    let ds = TileDataset::from_root(tmp.path(), TileLayout::default())?;
    assert_eq!(ds.len(), 2);

    let a = ds.get(1)?;
    let b = ds.get(1)?;
    assert_eq!(a.image_chw, b.image_chw);
    assert_eq!(a.label, b.label);
    assert_eq!(a.image_chw.len(), 3 * 16 * 16);
    assert_eq!(a.label.len(), 16 * 16);
    // Left half is foreground, right half background.
    assert_eq!(a.label[0], 1.0);
    assert_eq!(a.label[15], 0.0);
    assert!(a.label.iter().all(|v| *v == 0.0 || *v == 1.0));
    Ok(())
}

#[test]
fn corrupt_image_propagates_decode_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tile(tmp.path(), 1, 1, 4)?;
    fs::write(tmp.path().join("1/images/tile_1_000.jpg"), b"not a jpeg")?;
    let ds = TileDataset::from_root(tmp.path(), TileLayout::default())?;
    let err = ds.get(0).unwrap_err();
    assert!(matches!(err, burn_dataset::BurnDatasetError::Image { .. }));
    Ok(())
}

#[test]
fn tiles_below_min_side_are_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tile(tmp.path(), 1, 1, 8)?;
    let ds = TileDataset::from_root(tmp.path(), TileLayout::default())?;
    let err = ds.get(0).unwrap_err();
    assert!(matches!(err, burn_dataset::BurnDatasetError::Shape { .. }));
    assert!(err.to_string().contains("at least 16"));
    Ok(())
}

#[test]
fn batch_iter_yields_shaped_tensors() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tile(tmp.path(), 1, 5, 16)?;
    let ds = TileDataset::from_root(tmp.path(), TileLayout::default())?;
    let device = Default::default();
    let mut iter = BatchIter::new(
        &ds,
        BatchConfig {
            batch_size: 2,
            shuffle: true,
            seed: Some(1),
            drop_last: false,
        },
    );
    assert_eq!(iter.num_batches(), 3);

    let mut seen = Vec::new();
    while let Some(batch) = iter.next_batch::<B>(&device)? {
        let n = batch.indices.len();
        assert_eq!(batch.images.dims(), [n, 3, 16, 16]);
        assert_eq!(batch.labels.dims(), [n, 1, 16, 16]);
        seen.extend(batch.indices);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);

    iter.reset();
    assert!(iter.next_batch::<B>(&device)?.is_some());
    Ok(())
}
