//! Transaction relay service.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ contracts (wrappers) ──▶ dispatch::Dispatcher
//!                                          │
//!              ┌───────────────┬───────────┼──────────────┬──────────────┐
//!              ▼               ▼           ▼              ▼              ▼
//!         pool (lease)    vault (keys)  gas (fees)   nonce (seq)   submitter
//!                                                                       │
//!                                                                       ▼
//!                                         watcher ◀── blockchain client ──▶ RPC
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use tx_relay::config::load_config;
use tx_relay::lifecycle::{self, startup, Shutdown};
use tx_relay::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "tx-relay", version, about = "Blockchain transaction relay")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(Some(&args.config))?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tx-relay starting");
    tracing::info!(
        rpc_url = %config.blockchain.rpc_url,
        network = %config.blockchain.network,
        chain_id = config.blockchain.chain_id,
        pool_enabled = config.wallet.pool.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let relay = lifecycle::start(&config).await?;
    tracing::info!(
        default_address = %relay.dispatcher.default_identity().address(),
        "Relay ready"
    );

    let shutdown = Shutdown::new();
    let reporter = startup::spawn_reporter(
        relay.dispatcher.clone(),
        relay.client.clone(),
        Duration::from_secs(config.observability.stats_interval_secs.max(1)),
        &shutdown,
    );

    lifecycle::shutdown_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();
    let _ = reporter.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
