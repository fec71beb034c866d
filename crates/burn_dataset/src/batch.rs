//! Batch iteration for training and evaluation.

use crate::dataset::TileDataset;
use crate::types::{BurnDatasetError, DatasetResult, SegmentationItem};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Shuffle sample order at construction (and on every `reset`).
    pub shuffle: bool,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
    /// Drop the last partial batch.
    pub drop_last: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            shuffle: true,
            seed: None,
            drop_last: false,
        }
    }
}

pub struct SegmentationBatch<B: Backend> {
    /// Shape [batch, 3, height, width], values in [0, 1].
    pub images: Tensor<B, 4>,
    /// Shape [batch, 1, height, width], values in {0, 1}.
    pub labels: Tensor<B, 4>,
    /// Dataset indices of the samples, in batch order.
    pub indices: Vec<usize>,
}

/// Stack decoded items into batch tensors. All items must share one size.
pub fn collate<B: Backend>(
    items: &[SegmentationItem],
    device: &B::Device,
) -> DatasetResult<SegmentationBatch<B>> {
    let Some(first) = items.first() else {
        return Err(BurnDatasetError::Other("cannot collate empty batch".into()));
    };
    let (width, height) = (first.width, first.height);
    let plane = (width * height) as usize;
    let batch = items.len();

    let mut image_buf: Vec<f32> = Vec::with_capacity(batch * plane * 3);
    let mut label_buf: Vec<f32> = Vec::with_capacity(batch * plane);
    let mut indices = Vec::with_capacity(batch);
    for item in items {
        if item.width != width || item.height != height {
            return Err(BurnDatasetError::Other(format!(
                "image dimensions differ within batch: sample {} is {}x{}, expected {}x{}",
                item.index, item.width, item.height, width, height
            )));
        }
        image_buf.extend_from_slice(&item.image_chw);
        label_buf.extend_from_slice(&item.label);
        indices.push(item.index);
    }

    let (h, w) = (height as usize, width as usize);
    let images = Tensor::<B, 4>::from_data(TensorData::new(image_buf, [batch, 3, h, w]), device);
    let labels = Tensor::<B, 4>::from_data(TensorData::new(label_buf, [batch, 1, h, w]), device);
    Ok(SegmentationBatch {
        images,
        labels,
        indices,
    })
}

pub struct BatchIter<'a> {
    dataset: &'a TileDataset,
    order: Vec<usize>,
    cursor: usize,
    cfg: BatchConfig,
    rng: rand::rngs::StdRng,
}

impl<'a> BatchIter<'a> {
    /// Iterate over the whole dataset.
    pub fn new(dataset: &'a TileDataset, cfg: BatchConfig) -> Self {
        Self::from_indices(dataset, (0..dataset.len()).collect(), cfg)
    }

    /// Iterate over a subset of the dataset (e.g. one side of a split).
    pub fn from_indices(dataset: &'a TileDataset, indices: Vec<usize>, cfg: BatchConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
        };
        let mut iter = Self {
            dataset,
            order: indices,
            cursor: 0,
            cfg,
            rng,
        };
        iter.reset();
        iter
    }

    /// Rewind for a new epoch, reshuffling if configured.
    pub fn reset(&mut self) {
        self.cursor = 0;
        if self.cfg.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of batches one pass yields.
    pub fn num_batches(&self) -> usize {
        let size = self.cfg.batch_size.max(1);
        if self.cfg.drop_last {
            self.order.len() / size
        } else {
            self.order.len().div_ceil(size)
        }
    }

    /// Decode (in parallel) and collate the next batch, or `None` at the end of the pass.
    pub fn next_batch<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<SegmentationBatch<B>>> {
        let size = self.cfg.batch_size.max(1);
        let remaining = self.order.len().saturating_sub(self.cursor);
        if remaining == 0 || (self.cfg.drop_last && remaining < size) {
            return Ok(None);
        }
        let end = self.cursor + remaining.min(size);
        let chunk = &self.order[self.cursor..end];
        self.cursor = end;

        let dataset = self.dataset;
        let items = chunk
            .par_iter()
            .map(|&idx| dataset.get(idx))
            .collect::<DatasetResult<Vec<_>>>()?;
        collate(&items, device).map(Some)
    }
}
