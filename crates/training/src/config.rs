use std::path::{Path, PathBuf};

use anyhow::Context;
use burn_dataset::{SplitSpec, TileLayout};
use clap::{Args, ValueEnum};
use models::UNetConfig;
use serde::Deserialize;

pub const DEFAULT_CONFIG_NAME: &str = "unet-seg.toml";
pub const CONFIG_ENV: &str = "UNET_SEG_CONFIG";

pub const MODEL_FILE: &str = "model.bin";
pub const INTERRUPTED_FILE: &str = "INTERRUPTED.bin";
pub const REPORT_FILE: &str = "train_report.json";

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    NdArray,
    Wgpu,
}

/// Fully resolved settings for a training/evaluation run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub data_root: PathBuf,
    pub models_dir: PathBuf,
    pub predictions_dir: PathBuf,
    pub skip_first_tile: bool,
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub weight_decay: f32,
    pub momentum: f32,
    pub split: SplitSpec,
    pub seed: Option<u64>,
    pub base_channels: usize,
    pub confidence_threshold: f32,
    /// Stop evaluation after this many samples.
    pub eval_limit: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data/processed"),
            models_dir: PathBuf::from("models"),
            predictions_dir: PathBuf::from("predictions/unet"),
            skip_first_tile: false,
            epochs: 20,
            batch_size: 2,
            lr: 1e-3,
            weight_decay: 1e-8,
            momentum: 0.9,
            split: SplitSpec::default(),
            seed: None,
            base_channels: 64,
            confidence_threshold: vision_core::postprocess::DEFAULT_CONFIDENCE_THRESHOLD,
            eval_limit: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RunConfigFile {
    models_dir: Option<String>,
    data: Option<DataSection>,
    training: Option<TrainingSection>,
    eval: Option<EvalSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DataSection {
    root: Option<String>,
    skip_first_tile: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrainingSection {
    epochs: Option<usize>,
    batch_size: Option<usize>,
    lr: Option<f64>,
    weight_decay: Option<f32>,
    momentum: Option<f32>,
    train_ratio: Option<f32>,
    train_size: Option<usize>,
    test_size: Option<usize>,
    seed: Option<u64>,
    base_channels: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EvalSection {
    predictions_dir: Option<String>,
    confidence_threshold: Option<f32>,
    limit: Option<usize>,
}

impl RunConfig {
    /// Load from `$UNET_SEG_CONFIG` if set, else `unet-seg.toml` if present, else defaults.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_NAME);
        if default_path.exists() {
            return Self::from_path(default_path);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let file: RunConfigFile = toml::from_str(raw)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: RunConfigFile) -> Self {
        let mut cfg = Self::default();
        if let Some(dir) = file.models_dir {
            cfg.models_dir = PathBuf::from(dir);
        }
        let data = file.data.unwrap_or_default();
        if let Some(root) = data.root {
            cfg.data_root = PathBuf::from(root);
        }
        cfg.skip_first_tile = data.skip_first_tile.unwrap_or(cfg.skip_first_tile);

        let training = file.training.unwrap_or_default();
        cfg.epochs = training.epochs.unwrap_or(cfg.epochs);
        cfg.batch_size = training.batch_size.unwrap_or(cfg.batch_size);
        cfg.lr = training.lr.unwrap_or(cfg.lr);
        cfg.weight_decay = training.weight_decay.unwrap_or(cfg.weight_decay);
        cfg.momentum = training.momentum.unwrap_or(cfg.momentum);
        cfg.seed = training.seed.or(cfg.seed);
        cfg.base_channels = training.base_channels.unwrap_or(cfg.base_channels);
        cfg.split = split_from_parts(
            training.train_ratio,
            training.train_size,
            training.test_size,
            cfg.split,
        );

        let eval = file.eval.unwrap_or_default();
        if let Some(dir) = eval.predictions_dir {
            cfg.predictions_dir = PathBuf::from(dir);
        }
        cfg.confidence_threshold = eval
            .confidence_threshold
            .unwrap_or(cfg.confidence_threshold);
        cfg.eval_limit = eval.limit.or(cfg.eval_limit);
        cfg
    }

    pub fn layout(&self) -> TileLayout {
        TileLayout {
            skip_first_tile: self.skip_first_tile,
        }
    }

    pub fn model_config(&self) -> UNetConfig {
        UNetConfig::new(3, 1).with_base_channels(self.base_channels)
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(MODEL_FILE)
    }

    pub fn interrupted_path(&self) -> PathBuf {
        self.models_dir.join(INTERRUPTED_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.models_dir.join(REPORT_FILE)
    }
}

/// Explicit sizes win over a ratio; a missing size counts as zero.
fn split_from_parts(
    ratio: Option<f32>,
    train: Option<usize>,
    test: Option<usize>,
    fallback: SplitSpec,
) -> SplitSpec {
    match (train, test, ratio) {
        (Some(train), Some(test), _) => SplitSpec::Sizes { train, test },
        (Some(train), None, _) => SplitSpec::Sizes { train, test: 0 },
        (None, Some(test), _) => SplitSpec::Sizes { train: 0, test },
        (None, None, Some(ratio)) => SplitSpec::Ratio(ratio),
        (None, None, None) => fallback,
    }
}

/// Flags shared by every binary; each one overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML config file (defaults to $UNET_SEG_CONFIG, then ./unet-seg.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Root holding numbered tile directories.
    #[arg(long)]
    pub data_root: Option<PathBuf>,
    /// Directory for model snapshots.
    #[arg(long)]
    pub models_dir: Option<PathBuf>,
    /// Directory for rendered predictions.
    #[arg(long)]
    pub predictions_dir: Option<PathBuf>,
    /// Drop the lowest-numbered tile when scanning (`--skip-first-tile false` turns it off).
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub skip_first_tile: Option<bool>,
    /// Seed for splits and shuffling.
    #[arg(long)]
    pub seed: Option<u64>,
    /// U-Net width of the first encoder stage.
    #[arg(long)]
    pub base_channels: Option<usize>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
}

impl ConfigArgs {
    pub fn resolve(&self) -> anyhow::Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::from_path(path)?,
            None => RunConfig::load()?,
        };
        self.apply(&mut cfg);
        Ok(cfg)
    }

    pub fn apply(&self, cfg: &mut RunConfig) {
        if let Some(root) = &self.data_root {
            cfg.data_root = root.clone();
        }
        if let Some(dir) = &self.models_dir {
            cfg.models_dir = dir.clone();
        }
        if let Some(dir) = &self.predictions_dir {
            cfg.predictions_dir = dir.clone();
        }
        if let Some(skip) = self.skip_first_tile {
            cfg.skip_first_tile = skip;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if let Some(channels) = self.base_channels {
            cfg.base_channels = channels;
        }
    }
}
