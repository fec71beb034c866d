//! Tile dataset loading, splitting, and Burn-compatible batching.
//!
//! This crate provides utilities for:
//! - Scanning `<root>/<tile>/images` and pairing each image with its mask
//! - Lazily decoding images and thresholding masks into binary labels
//! - Train/test splitting
//! - Burn-compatible batch iteration

pub mod dataset;
pub mod splits;
pub mod tiles;
pub mod types;
pub mod validation;

#[cfg(feature = "burn-runtime")]
pub mod batch;

pub use dataset::{threshold_mask, TileDataset};
pub use splits::{split_indices, SplitSpec};
pub use tiles::{enumerate_samples, list_tiles, mask_path_for};
pub use types::*;
pub use validation::summarize_layout;

#[cfg(feature = "burn-runtime")]
pub use batch::{collate, BatchConfig, BatchIter, SegmentationBatch};
