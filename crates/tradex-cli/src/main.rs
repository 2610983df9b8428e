//! tradex - interactive Deribit client entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Interactive JSON-RPC/WebSocket client for Deribit
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRADEX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before any wss:// connection
    tradex_ws::init_crypto();

    let args = Args::parse();
    tradex_telemetry::init_logging()?;

    info!("Starting tradex v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > TRADEX_CONFIG > built-in defaults
    let config_path = args
        .config
        .or_else(|| std::env::var("TRADEX_CONFIG").ok());
    let config = tradex_cli::AppConfig::load(config_path.as_deref())?;
    info!(
        config_path = config_path.as_deref().unwrap_or("<defaults>"),
        default_uri = %config.default_uri,
        "Configuration loaded"
    );

    let mut app = tradex_cli::App::new(config);
    app.run().await?;

    Ok(())
}
