//! Lazily decoded tile dataset: paths are scanned once, pixels are read per access.

use crate::tiles::enumerate_samples;
use crate::types::{
    BurnDatasetError, DatasetResult, SegmentationItem, TileLayout, TileSample, MASK_THRESHOLD,
    MIN_TILE_SIDE,
};
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};

/// Binarize a grayscale mask: `>= MASK_THRESHOLD` is 1, everything else 0.
pub fn threshold_mask(mask: &[u8]) -> Vec<f32> {
    mask.iter()
        .map(|&v| if v >= MASK_THRESHOLD { 1.0 } else { 0.0 })
        .collect()
}

/// Flatten an RGB image into CHW floats in [0, 1].
pub fn rgb_to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut out = vec![0.0f32; plane * 3];
    for (i, px) in img.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = px[c] as f32 / 255.0;
        }
    }
    out
}

pub fn load_rgb(path: &Path) -> DatasetResult<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| BurnDatasetError::Image {
            path: path.to_path_buf(),
            source: e,
        })
}

pub fn load_gray(path: &Path) -> DatasetResult<GrayImage> {
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|e| BurnDatasetError::Image {
            path: path.to_path_buf(),
            source: e,
        })
}

#[derive(Debug, Clone)]
pub struct TileDataset {
    root: PathBuf,
    samples: Vec<TileSample>,
}

impl TileDataset {
    pub fn from_root(root: &Path, layout: TileLayout) -> DatasetResult<Self> {
        let samples = enumerate_samples(root, layout)?;
        tracing::debug!(root = %root.display(), samples = samples.len(), "indexed tile dataset");
        Ok(Self::from_samples(root, samples))
    }

    pub fn from_samples(root: &Path, samples: Vec<TileSample>) -> Self {
        Self {
            root: root.to_path_buf(),
            samples,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TileSample] {
        &self.samples
    }

    pub fn sample(&self, index: usize) -> Option<&TileSample> {
        self.samples.get(index)
    }

    /// Decode the image and binary label at `index`.
    pub fn get(&self, index: usize) -> DatasetResult<SegmentationItem> {
        let sample = self.samples.get(index).ok_or_else(|| {
            BurnDatasetError::Other(format!(
                "index {index} out of range for dataset of {} samples",
                self.samples.len()
            ))
        })?;
        let image = load_rgb(&sample.image)?;
        let mask = load_gray(&sample.mask)?;
        let (width, height) = image.dimensions();
        if width < MIN_TILE_SIDE || height < MIN_TILE_SIDE {
            return Err(BurnDatasetError::Shape {
                path: sample.image.clone(),
                msg: format!(
                    "image is {width}x{height}; both sides must be at least {MIN_TILE_SIDE}"
                ),
            });
        }
        if mask.dimensions() != (width, height) {
            return Err(BurnDatasetError::Shape {
                path: sample.mask.clone(),
                msg: format!(
                    "mask is {}x{}, image {:?} is {}x{}",
                    mask.width(),
                    mask.height(),
                    sample.image,
                    width,
                    height
                ),
            });
        }
        Ok(SegmentationItem {
            index,
            image_chw: rgb_to_chw(&image),
            label: threshold_mask(mask.as_raw()),
            width,
            height,
        })
    }
}
