use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use steernet::{train, OptimizerKind, TrainerConfig};

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the steering CNN on a capture folder")]
struct Args {
    /// Folder of labeled capture images.
    #[arg(long)]
    train_folder: PathBuf,
    /// Track name, used in artifact and log naming.
    #[arg(long)]
    track: String,
    /// Optimizer to fit with.
    #[arg(long, value_enum, default_value_t = OptimizerKind::Adam)]
    optimizer: OptimizerKind,
    /// Epochs without validation improvement before stopping.
    #[arg(long, default_value_t = 10)]
    patience: usize,
    /// Optional TOML config; defaults apply when absent.
    #[arg(long, default_value = "steernet.toml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let cfg = TrainerConfig::load_or_default(&args.config)?;

    let best = train(
        &args.train_folder,
        &args.track,
        args.optimizer,
        args.patience,
        &cfg,
    )?;
    println!("best validation loss: {best:.4}");
    Ok(())
}
