//! CLIP Image Classifier - Main Entry Point

use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;

    info!("=== CLIP Image Classifier v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Model: {}", settings.model_path().display());

    run_server(settings).await
}
