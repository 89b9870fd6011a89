//! walletdash - wallet session and dashboard sync service.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Wallet session and dashboard data sync service.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via WALLETDASH_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    walletdash_telemetry::init_logging()?;

    info!("Starting walletdash v{}", env!("CARGO_PKG_VERSION"));

    let config = walletdash_app::AppConfig::load(args.config)?;
    info!(
        dashboard_url = %config.dashboard_url,
        wallet_rpc = ?config.wallet.rpc_url,
        cache_dir = %config.cache.dir.display(),
        "Configuration loaded"
    );

    walletdash_app::Application::new(config).run().await?;

    Ok(())
}
