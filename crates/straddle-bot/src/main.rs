//! Straddle order lifecycle runner - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Two-leg options straddle with target, stop-loss and trailing exits.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via STRADDLE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    straddle_telemetry::init_logging()?;

    info!("Starting straddle-bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > STRADDLE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("STRADDLE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = straddle_bot::AppConfig::from_file(&config_path)?;
    info!(
        quantity = config.quantity,
        cutoff = %config.cutoff,
        ce = %config.entry_plan.ce_symbol,
        pe = %config.entry_plan.pe_symbol,
        "Configuration loaded"
    );

    let app = straddle_bot::Application::new(config)?;
    let summary = app.run().await?;

    info!(
        ticks = summary.ticks,
        cycles_completed = summary.cycles_completed,
        last_cycle_id = summary.last_cycle_id,
        final_state = %summary.final_state,
        "Run finished"
    );
    Ok(())
}
