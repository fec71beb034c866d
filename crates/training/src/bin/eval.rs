use clap::Parser;
use std::path::PathBuf;
use training::config::ConfigArgs;
use training::util::{load_unet_from_checkpoint, select_device, validate_backend_choice};
use training::evaluate;

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Render image | mask | prediction panels for a saved U-Net checkpoint"
)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    /// Checkpoint path to load (defaults to <models_dir>/model.bin).
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    /// Probabilities below this are zeroed after min-max normalization.
    #[arg(long)]
    threshold: Option<f32>,
    /// Evaluate at most this many tiles.
    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    training::init_tracing();
    let args = Args::parse();
    validate_backend_choice(args.config.backend)?;

    let mut cfg = args.config.resolve()?;
    if let Some(threshold) = args.threshold {
        cfg.confidence_threshold = threshold;
    }
    if args.limit.is_some() {
        cfg.eval_limit = args.limit;
    }
    let ckpt = args.checkpoint.unwrap_or_else(|| cfg.model_path());

    let device = select_device();
    let model = load_unet_from_checkpoint(&ckpt, cfg.model_config(), &device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", ckpt.display()))?;
    let summary = evaluate(&model, &cfg, &device)?;
    println!(
        "Eval: {} tiles, mean IoU {:.3}, threshold {}",
        summary.samples.len(),
        summary.mean_iou,
        summary.confidence_threshold
    );
    Ok(())
}
