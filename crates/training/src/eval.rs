use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn_dataset::{BatchConfig, BatchIter, TileDataset};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use vision_core::overlay::{chw_to_rgb, save_panels, unit_map_to_gray};
use vision_core::postprocess::{mask_overlap, refine_probability_map};

use crate::config::RunConfig;
use crate::UNet;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleScore {
    /// Position in evaluation order; also the `img_<n>.png` suffix.
    pub order: usize,
    pub dataset_index: usize,
    pub image: PathBuf,
    pub output: PathBuf,
    pub iou: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalSummary {
    pub confidence_threshold: f32,
    pub mean_iou: f32,
    /// Set when a stop request ended the pass before every tile was rendered.
    #[serde(default)]
    pub interrupted: bool,
    pub samples: Vec<SampleScore>,
}

fn to_vec<B: Backend, const D: usize>(
    tensor: burn::tensor::Tensor<B, D>,
    what: &str,
) -> anyhow::Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read back {what}: {e:?}"))
}

/// Predict every tile (batch size 1, shuffled) and render image | mask | prediction
/// panels into `cfg.predictions_dir`.
///
/// `model` must live on a non-autodiff backend (`AutodiffModule::valid`), which
/// also puts batch norm in inference mode.
pub fn evaluate<B: Backend>(
    model: &UNet<B>,
    cfg: &RunConfig,
    device: &B::Device,
) -> anyhow::Result<EvalSummary> {
    evaluate_until(model, cfg, device, &AtomicBool::new(false))
}

/// [`evaluate`], checking `stop` before each tile. A stopped pass still writes
/// the summary for the tiles rendered so far.
pub fn evaluate_until<B: Backend>(
    model: &UNet<B>,
    cfg: &RunConfig,
    device: &B::Device,
    stop: &AtomicBool,
) -> anyhow::Result<EvalSummary> {
    let dataset = TileDataset::from_root(&cfg.data_root, cfg.layout())?;
    fs::create_dir_all(&cfg.predictions_dir)?;
    let mut loader = BatchIter::new(
        &dataset,
        BatchConfig {
            batch_size: 1,
            shuffle: true,
            seed: cfg.seed,
            drop_last: false,
        },
    );

    let mut summary = EvalSummary {
        confidence_threshold: cfg.confidence_threshold,
        ..Default::default()
    };
    loop {
        if stop.load(Ordering::SeqCst) {
            summary.interrupted = true;
            tracing::warn!(
                "evaluation interrupted after {} tiles",
                summary.samples.len()
            );
            break;
        }
        let Some(batch) = loader.next_batch::<B>(device)? else {
            break;
        };
        let order = summary.samples.len();
        if cfg.eval_limit.is_some_and(|limit| order >= limit) {
            break;
        }
        let [_, channels, height, width] = batch.images.dims();
        anyhow::ensure!(
            channels == model.n_channels(),
            "model expects {} input channels, sample has {}",
            model.n_channels(),
            channels
        );

        let probs = sigmoid(model.forward(batch.images.clone()))
            .slice([0..1, 0..1, 0..height, 0..width])
            .reshape([height, width]);
        let probs = to_vec(probs, "prediction")?;
        let refined = refine_probability_map(&probs, cfg.confidence_threshold);

        let image = to_vec(batch.images, "image")?;
        let label = to_vec(batch.labels, "label")?;
        let (w, h) = (width as u32, height as u32);
        let rgb = chw_to_rgb(&image, w, h)
            .ok_or_else(|| anyhow::anyhow!("image buffer does not match {w}x{h}"))?;
        let truth = unit_map_to_gray(&label, w, h)
            .ok_or_else(|| anyhow::anyhow!("label buffer does not match {w}x{h}"))?;
        let pred = unit_map_to_gray(&refined, w, h)
            .ok_or_else(|| anyhow::anyhow!("prediction buffer does not match {w}x{h}"))?;

        let output = cfg.predictions_dir.join(format!("img_{order}.png"));
        save_panels(&output, &rgb, &truth, &pred)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", output.display()))?;

        let dataset_index = batch.indices.first().copied().unwrap_or_default();
        let iou = mask_overlap(&refined, &label).iou();
        tracing::debug!(order, dataset_index, iou, "rendered {}", output.display());
        summary.samples.push(SampleScore {
            order,
            dataset_index,
            image: dataset
                .sample(dataset_index)
                .map(|s| s.image.clone())
                .unwrap_or_default(),
            output,
            iou,
        });
    }

    if !summary.samples.is_empty() {
        summary.mean_iou =
            summary.samples.iter().map(|s| s.iou).sum::<f32>() / summary.samples.len() as f32;
    }
    let summary_path = cfg.predictions_dir.join(SUMMARY_FILE);
    fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?)?;
    tracing::info!(
        "Eval complete: {} samples, mean IoU {:.3} (threshold {}), panels in {}",
        summary.samples.len(),
        summary.mean_iou,
        summary.confidence_threshold,
        cfg.predictions_dir.display()
    );
    Ok(summary)
}
