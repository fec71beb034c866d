//! Scanning `<root>/<tile>/images/*` into image/mask path pairs.

use crate::types::{BurnDatasetError, DatasetResult, TileLayout, TileSample, IMAGES_DIR, MASKS_DIR};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Derive the mask path for an image: `images/` becomes `masks/` and a JPEG
/// extension becomes `.png`. Other extensions are kept.
pub fn mask_path_for(image: &Path) -> PathBuf {
    let file_name = image.file_name().map(PathBuf::from).unwrap_or_default();
    let mut mask = match image.parent() {
        Some(dir) if dir.file_name().and_then(|s| s.to_str()) == Some(IMAGES_DIR) => dir
            .parent()
            .map(|tile| tile.join(MASKS_DIR))
            .unwrap_or_else(|| PathBuf::from(MASKS_DIR)),
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::new(),
    }
    .join(file_name);
    let is_jpeg = mask
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        mask.set_extension("png");
    }
    mask
}

/// Collect listing results, failing on the first unreadable entry of `dir`.
fn entry_paths(
    dir: &Path,
    entries: impl IntoIterator<Item = io::Result<PathBuf>>,
) -> DatasetResult<Vec<PathBuf>> {
    entries
        .into_iter()
        .map(|entry| {
            entry.map_err(|e| BurnDatasetError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        })
        .collect()
}

/// Numbered tile directories under `root`, sorted by tile number.
pub fn list_tiles(root: &Path) -> DatasetResult<Vec<(u32, PathBuf)>> {
    let entries = fs::read_dir(root).map_err(|e| BurnDatasetError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;
    let mut tiles = Vec::new();
    for path in entry_paths(root, entries.map(|e| e.map(|e| e.path())))? {
        if !path.is_dir() {
            continue;
        }
        let Some(number) = path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            continue;
        };
        tiles.push((number, path));
    }
    tiles.sort_by_key(|(number, _)| *number);
    Ok(tiles)
}

/// Enumerate every image/mask pair across the tiles under `root`.
///
/// Mask files are not checked for existence; see `validation::summarize_layout`.
pub fn enumerate_samples(root: &Path, layout: TileLayout) -> DatasetResult<Vec<TileSample>> {
    let mut tiles = list_tiles(root)?;
    if layout.skip_first_tile && !tiles.is_empty() {
        tiles.remove(0);
    }
    let mut samples = Vec::new();
    for (tile, tile_dir) in tiles {
        let images_dir = tile_dir.join(IMAGES_DIR);
        if !images_dir.is_dir() {
            tracing::debug!(tile, "tile has no {IMAGES_DIR}/ directory; skipping");
            continue;
        }
        let entries = fs::read_dir(&images_dir).map_err(|e| BurnDatasetError::Io {
            path: images_dir.clone(),
            source: e,
        })?;
        let mut images: Vec<PathBuf> =
            entry_paths(&images_dir, entries.map(|e| e.map(|e| e.path())))?
                .into_iter()
                .filter(|path| path.is_file())
                .collect();
        images.sort();
        samples.extend(images.into_iter().map(|image| TileSample {
            tile,
            mask: mask_path_for(&image),
            image,
        }));
    }
    Ok(samples)
}
