use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{Optimizer, RmsPropConfig};
use burn::record::{BinFileRecorder, FullPrecisionSettings, RecorderError};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn_dataset::{
    split_indices, summarize_layout, BatchConfig, BatchIter, TileDataset,
};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{BackendKind, ConfigArgs, RunConfig};
use crate::eval::{evaluate_until, EvalSummary};
use crate::loss::{bce_with_logits, scalar_f32};
use crate::scaler::GradScaler;
use crate::{TrainBackend, UNet, UNetConfig};

pub type ADBackend = Autodiff<TrainBackend>;
pub type TrainDevice = <TrainBackend as Backend>::Device;

/// Default device of the compiled backend: the best available GPU adapter
/// with `backend-wgpu`, otherwise the CPU.
pub fn select_device() -> TrainDevice {
    TrainDevice::default()
}

#[derive(Args, Debug, Clone, Default)]
pub struct TrainArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Number of epochs.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    /// Fraction of samples used for training (ignored with explicit sizes).
    #[arg(long)]
    pub train_ratio: Option<f32>,
    /// Explicit number of training samples.
    #[arg(long, requires = "test_size")]
    pub train_size: Option<usize>,
    /// Explicit number of test samples.
    #[arg(long, requires = "train_size")]
    pub test_size: Option<usize>,
}

impl TrainArgs {
    pub fn resolve(&self) -> anyhow::Result<RunConfig> {
        let mut cfg = self.config.resolve()?;
        if let Some(epochs) = self.epochs {
            cfg.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            cfg.lr = lr;
        }
        match (self.train_size, self.test_size, self.train_ratio) {
            (Some(train), Some(test), _) => {
                cfg.split = burn_dataset::SplitSpec::Sizes { train, test };
            }
            (_, _, Some(ratio)) => cfg.split = burn_dataset::SplitSpec::Ratio(ratio),
            _ => {}
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainReport {
    pub epochs_planned: usize,
    /// Summed batch loss per epoch (the last entry may be partial if interrupted).
    pub epoch_losses: Vec<f32>,
    pub batches: usize,
    pub skipped_steps: usize,
    pub interrupted: bool,
    pub train_samples: usize,
    pub test_samples: usize,
    pub base_channels: usize,
}

#[derive(Debug)]
pub struct TrainOutcome<B: AutodiffBackend> {
    pub model: UNet<B>,
    pub report: TrainReport,
}

/// RMSProp with momentum and L2 weight decay.
pub fn build_optimizer(cfg: &RunConfig) -> impl Optimizer<UNet<ADBackend>, ADBackend> {
    RmsPropConfig::new()
        .with_alpha(0.99)
        .with_epsilon(1e-8)
        .with_momentum(cfg.momentum)
        .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay)))
        .init::<ADBackend, UNet<ADBackend>>()
}

/// Run `epochs` passes over `loader`, checking `stop` between batches.
///
/// `on_batch` sees every finished batch as `(batch number, loss)`, counting
/// from zero across epochs.
#[allow(clippy::too_many_arguments)]
pub fn train_epochs<B, O, F>(
    mut model: UNet<B>,
    optim: &mut O,
    scaler: &mut GradScaler,
    loader: &mut BatchIter<'_>,
    epochs: usize,
    lr: f64,
    device: &B::Device,
    stop: &AtomicBool,
    mut on_batch: F,
) -> anyhow::Result<TrainOutcome<B>>
where
    B: AutodiffBackend,
    O: Optimizer<UNet<B>, B>,
    F: FnMut(usize, f32),
{
    let mut report = TrainReport {
        epochs_planned: epochs,
        ..Default::default()
    };
    for epoch in 0..epochs {
        loader.reset();
        let mut epoch_loss = 0.0f32;
        let mut epoch_batches = 0usize;
        loop {
            if stop.load(Ordering::SeqCst) {
                report.interrupted = true;
                break;
            }
            let Some(batch) = loader.next_batch::<B>(device)? else {
                break;
            };
            let [_, channels, _, _] = batch.images.dims();
            if channels != model.n_channels() {
                anyhow::bail!(
                    "Network has been defined with {} input channels, but loaded images have {} \
                     channels. Please check that the images are loaded correctly.",
                    model.n_channels(),
                    channels
                );
            }

            let logits = model.forward(batch.images);
            let loss = bce_with_logits(logits, batch.labels);
            let loss_value = scalar_f32(loss.clone().detach())?;

            let grads = loss.backward();
            model = scaler.step(optim, lr, model, grads, loss_value);
            if !scaler.found_non_finite() {
                epoch_loss += loss_value;
            }
            scaler.update();

            on_batch(report.batches, loss_value);
            epoch_batches += 1;
            report.batches += 1;
        }
        if report.interrupted {
            if epoch_batches > 0 {
                report.epoch_losses.push(epoch_loss);
            }
            tracing::warn!(
                "training interrupted during epoch {}/{} after {} batches",
                epoch + 1,
                epochs,
                epoch_batches
            );
            break;
        }
        tracing::info!("Epoch [{}/{}], Loss: {:.4}", epoch + 1, epochs, epoch_loss);
        report.epoch_losses.push(epoch_loss);
    }
    report.skipped_steps = scaler.skipped_steps();
    Ok(TrainOutcome { model, report })
}

pub fn save_checkpoint<B: Backend>(model: &UNet<B>, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))
}

pub fn load_unet_from_checkpoint<P: AsRef<Path>>(
    path: P,
    cfg: UNetConfig,
    device: &TrainDevice,
) -> Result<UNet<TrainBackend>, RecorderError> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    UNet::<TrainBackend>::new(cfg, device).load_file(path.as_ref(), &recorder, device)
}

/// Build the dataset and split, train, and persist snapshots plus the report.
///
/// An interrupted run writes `INTERRUPTED.bin` first; `model.bin` is written
/// either way.
pub fn train_model(
    cfg: &RunConfig,
    device: &TrainDevice,
    stop: &AtomicBool,
) -> anyhow::Result<TrainOutcome<ADBackend>> {
    let dataset = TileDataset::from_root(&cfg.data_root, cfg.layout()).map_err(|e| {
        anyhow::anyhow!("failed to index tiles under {}: {e}", cfg.data_root.display())
    })?;
    if dataset.is_empty() {
        anyhow::bail!("no tile images found under {}", cfg.data_root.display());
    }
    let layout = summarize_layout(dataset.samples());
    if !layout.is_complete() {
        tracing::warn!(
            missing = layout.missing_masks.len(),
            first = %layout.missing_masks[0].display(),
            "some images have no mask; loading them will fail"
        );
    }

    let (train_idx, test_idx) = split_indices(dataset.len(), cfg.split, cfg.seed)?;
    if train_idx.is_empty() {
        anyhow::bail!(
            "split {:?} leaves no training samples out of {}",
            cfg.split,
            dataset.len()
        );
    }
    let (train_samples, test_samples) = (train_idx.len(), test_idx.len());
    tracing::info!(
        tiles = layout.tiles.len(),
        train = train_samples,
        test = test_samples,
        "dataset ready"
    );

    let mut loader = BatchIter::from_indices(
        &dataset,
        train_idx,
        BatchConfig {
            batch_size: cfg.batch_size.max(1),
            shuffle: true,
            seed: cfg.seed,
            drop_last: false,
        },
    );
    let model = UNet::<ADBackend>::new(cfg.model_config(), device);
    let mut optim = build_optimizer(cfg);
    let mut scaler = GradScaler::new();

    let mut outcome = train_epochs(
        model,
        &mut optim,
        &mut scaler,
        &mut loader,
        cfg.epochs,
        cfg.lr,
        device,
        stop,
        |batch, loss| tracing::debug!(batch, loss, "batch done"),
    )?;
    outcome.report.train_samples = train_samples;
    outcome.report.test_samples = test_samples;
    outcome.report.base_channels = cfg.base_channels;

    if outcome.report.interrupted {
        let path = cfg.interrupted_path();
        save_checkpoint(&outcome.model, &path)?;
        tracing::warn!("saved interrupted snapshot to {}", path.display());
    }
    let path = cfg.model_path();
    save_checkpoint(&outcome.model, &path)?;
    tracing::info!("Saved checkpoint to {}", path.display());

    let report_path = cfg.report_path();
    fs::write(&report_path, serde_json::to_vec_pretty(&outcome.report)?)?;
    Ok(outcome)
}

/// Route Ctrl-C into a flag the training loop polls. A second Ctrl-C exits immediately.
pub fn install_interrupt_handler() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        tracing::warn!("interrupt received; stopping after the current step");
    })
    .map_err(|e| anyhow::anyhow!("failed to install Ctrl-C handler: {e}"))?;
    Ok(flag)
}

pub fn run_train(args: &TrainArgs) -> anyhow::Result<(RunConfig, UNet<ADBackend>)> {
    validate_backend_choice(args.config.backend)?;
    let cfg = args.resolve()?;
    let stop = install_interrupt_handler()?;
    let outcome = train_model(&cfg, &select_device(), &stop)?;
    Ok((cfg, outcome.model))
}

/// Train then evaluate, or (with `use_trained`) load `model.bin` then evaluate.
///
/// One Ctrl-C handler covers the whole run. An interrupt during training
/// snapshots and moves on to evaluating the partly trained model; an
/// interrupt during evaluation stops it after the current tile.
pub fn run_pipeline(args: &TrainArgs, use_trained: bool) -> anyhow::Result<EvalSummary> {
    validate_backend_choice(args.config.backend)?;
    let cfg = args.resolve()?;
    let device = select_device();
    let stop = install_interrupt_handler()?;
    let model = if use_trained {
        let path = cfg.model_path();
        load_unet_from_checkpoint(&path, cfg.model_config(), &device)
            .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))?
    } else {
        let outcome = train_model(&cfg, &device, &stop)?;
        // Re-arm so evaluation can be interrupted separately.
        stop.store(false, Ordering::SeqCst);
        outcome.model.valid()
    };
    evaluate_until(&model, &cfg, &device, &stop)
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::info!("built with backend-wgpu; running on the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}
