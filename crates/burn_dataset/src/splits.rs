//! Train/test splitting over dataset indices.

use crate::types::{BurnDatasetError, DatasetResult};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// How many samples go to training vs. testing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SplitSpec {
    /// Fraction of the dataset used for training; the rest is test.
    Ratio(f32),
    /// Explicit sizes. Their sum may not exceed the dataset length.
    Sizes { train: usize, test: usize },
}

impl Default for SplitSpec {
    fn default() -> Self {
        SplitSpec::Ratio(50.0 / 72.0)
    }
}

impl SplitSpec {
    /// Resolve to concrete (train, test) sizes for a dataset of `len` samples.
    pub fn sizes(&self, len: usize) -> DatasetResult<(usize, usize)> {
        match *self {
            SplitSpec::Ratio(ratio) => {
                if !(0.0..=1.0).contains(&ratio) {
                    return Err(BurnDatasetError::Split(format!(
                        "train ratio {ratio} outside [0, 1]"
                    )));
                }
                let train = ((len as f32) * ratio).round() as usize;
                let train = train.min(len);
                Ok((train, len - train))
            }
            SplitSpec::Sizes { train, test } => {
                if train + test > len {
                    return Err(BurnDatasetError::Split(format!(
                        "requested {train} train + {test} test samples but dataset has {len}"
                    )));
                }
                Ok((train, test))
            }
        }
    }
}

/// Shuffle `0..len` and cut it into train and test index lists.
pub fn split_indices(
    len: usize,
    spec: SplitSpec,
    seed: Option<u64>,
) -> DatasetResult<(Vec<usize>, Vec<usize>)> {
    let (train_len, test_len) = spec.sizes(len)?;
    let mut rng = match seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
    };
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut rng);
    let test = indices[train_len..train_len + test_len].to_vec();
    indices.truncate(train_len);
    Ok((indices, test))
}
