use clap::Parser;
use training::util::{run_train, TrainArgs};

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the tile U-Net and save models/model.bin")]
struct Cli {
    #[command(flatten)]
    train: TrainArgs,
}

fn main() -> anyhow::Result<()> {
    training::init_tracing();
    let cli = Cli::parse();
    run_train(&cli.train)?;
    Ok(())
}
