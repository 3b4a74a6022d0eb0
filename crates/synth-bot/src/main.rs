//! Demo binary: load config, assemble the pipeline, run the tick loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use synth_bot::{AppConfig, Pipeline};

#[derive(Debug, Parser)]
#[command(name = "synth-bot", about = "Synthetic pricing and arbitrage detection engine")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    synth_telemetry::init_logging().context("logging init failed")?;

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    info!(config = %cli.config.display(), "Configuration loaded");

    let mut pipeline = Pipeline::from_config(&config).context("pipeline assembly failed")?;
    pipeline.on_opportunity(Arc::new(|op| {
        info!(
            id = %op.id,
            kind = %op.kind,
            expected_profit = %op.expected_profit,
            total_cost = %op.total_cost,
            "Validated arbitrage opportunity"
        );
    }));

    pipeline.run().await?;
    Ok(())
}
