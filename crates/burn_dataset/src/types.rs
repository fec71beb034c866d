//! Core types, error definitions, and data structures for burn_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Mask intensities at or above this value are foreground.
pub const MASK_THRESHOLD: u8 = 250;

/// Directory holding the RGB tiles inside each numbered tile directory.
pub const IMAGES_DIR: &str = "images";
/// Directory holding the grayscale masks inside each numbered tile directory.
pub const MASKS_DIR: &str = "masks";

/// Smallest image side the U-Net accepts: four 2x pooling stages need at least 2^4 pixels.
pub const MIN_TILE_SIDE: u32 = 16;

pub type DatasetResult<T> = Result<T, BurnDatasetError>;

#[derive(Debug, Error)]
pub enum BurnDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("shape mismatch at {path}: {msg}")]
    Shape { path: PathBuf, msg: String },
    #[error("invalid split: {0}")]
    Split(String),
    #[error("{0}")]
    Other(String),
}

/// One image/mask pair inside a tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSample {
    /// Numeric name of the tile directory.
    pub tile: u32,
    pub image: PathBuf,
    pub mask: PathBuf,
}

/// How tile directories are discovered under the data root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLayout {
    /// Drop the lowest-numbered tile (legacy scan behaviour).
    pub skip_first_tile: bool,
}

/// A decoded sample ready for collation.
#[derive(Debug, Clone)]
pub struct SegmentationItem {
    pub index: usize,
    /// RGB image in CHW layout, normalized to [0, 1].
    pub image_chw: Vec<f32>,
    /// Binary label in HW layout, values in {0, 1}.
    pub label: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TileSummary {
    pub tile: u32,
    pub images: usize,
    pub missing_masks: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutSummary {
    pub tiles: Vec<TileSummary>,
    pub total_images: usize,
    pub missing_masks: Vec<PathBuf>,
}

impl LayoutSummary {
    pub fn is_complete(&self) -> bool {
        self.missing_masks.is_empty()
    }
}
