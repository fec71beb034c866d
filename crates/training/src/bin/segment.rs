use clap::Parser;
use training::util::{run_pipeline, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "segment",
    about = "Train (or load) the tile U-Net, then render predictions for every tile"
)]
struct Cli {
    /// Skip training and load the saved model.bin instead.
    #[arg(long, default_value_t = false)]
    use_trained: bool,
    #[command(flatten)]
    train: TrainArgs,
}

fn main() -> anyhow::Result<()> {
    training::init_tracing();
    let cli = Cli::parse();
    let summary = run_pipeline(&cli.train, cli.use_trained)?;
    println!(
        "{} predictions{}, mean IoU {:.3}",
        summary.samples.len(),
        if summary.interrupted { " (interrupted)" } else { "" },
        summary.mean_iou
    );
    Ok(())
}
