//! marketpulse feed client - entry point.
//!
//! Connects to the configured market data server, subscribes the configured
//! symbols, and streams quotes to structured logs until interrupted.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// marketpulse realtime market data client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PULSE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    pulse_ws::init_crypto();

    let args = Args::parse();

    pulse_telemetry::init_logging()?;

    info!("Starting marketpulse v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > PULSE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("PULSE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = pulse_cli::AppConfig::load(&config_path)?;
    info!(ws_url = %config.ws_url, symbols = ?config.symbols, "Configuration loaded");

    let mut app = pulse_cli::Application::new(config)?;
    app.run().await?;

    Ok(())
}
