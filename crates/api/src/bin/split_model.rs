//! Split the ONNX model into fixed-size parts, or reassemble it.

use api::{init_logging, Settings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "split-model", version, about = "Split or reassemble the CLIP model file")]
struct Cli {
    /// Configuration file (defaults to classifier.toml)
    #[arg(short, long, env = "CLASSIFIER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the part size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cut the model into numbered part files
    Split,
    /// Concatenate the part files back into the model
    Combine,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli
        .config
        .unwrap_or_else(|| PathBuf::from(api::config::DEFAULT_CONFIG_FILE));
    let settings = Settings::load_from(Some(config.as_path()))?;
    init_logging(&settings.logging)?;

    let mut artifact = settings.artifact();
    if let Some(size) = cli.chunk_size {
        artifact = artifact.with_chunk_size(size);
    }

    match cli.command {
        Command::Split => {
            let parts = artifact.split()?;
            info!(
                "Split {} into {} parts of up to {} bytes",
                artifact.model_path().display(),
                parts,
                artifact.chunk_size()
            );
        }
        Command::Combine => {
            let parts = artifact.combine()?;
            info!(
                "Combined {} parts into {}",
                parts,
                artifact.model_path().display()
            );
        }
    }

    Ok(())
}
