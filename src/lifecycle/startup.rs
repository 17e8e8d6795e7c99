//! Startup orchestration.
//!
//! # Responsibilities
//! - Check contract addresses before touching keys or the network
//! - Open the key vault and make sure the default identity exists
//! - Provision pool identities from the environment
//! - Connect the RPC client and wire the dispatcher and contract wrappers
//! - Start the periodic pool/RPC reporter
//!
//! # Design Decisions
//! - Fail fast: a missing contract address, master secret, default key or
//!   (when enabled) pool key stops startup
//! - Environment access goes through a lookup function so bootstrap is testable

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::blockchain::types::BlockchainError;
use crate::blockchain::BlockchainClient;
use crate::config::{PoolConfig, RelayConfig};
use crate::contracts::{ContractAddresses, Contracts};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pool::{PoolError, WalletPool};
use crate::vault::{Identity, KeyVault, VaultError};

/// Vault id of the identity used for non-pooled dispatches.
pub const DEFAULT_WALLET_ID: &str = "default";

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Private key not found in environment variable: {0}")]
    MissingDefaultKey(String),

    #[error("Blockchain error: {0}")]
    Blockchain(#[from] BlockchainError),

    #[error("Wallet pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Wallet pool enabled but no keys found under {prefix}1..={size}")]
    EmptyPool { prefix: String, size: usize },

    #[error("Contract setup error: {0}")]
    Contracts(#[from] DispatchError),
}

/// A fully wired relay.
#[derive(Debug)]
pub struct Relay {
    pub vault: Arc<KeyVault>,
    pub client: Arc<BlockchainClient>,
    pub dispatcher: Arc<Dispatcher<BlockchainClient>>,
    pub contracts: Contracts<BlockchainClient>,
}

/// Build every subsystem from a validated configuration.
pub async fn start(config: &RelayConfig) -> Result<Relay, StartupError> {
    let lookup = |var: &str| std::env::var(var).ok();
    let addresses = ContractAddresses::from_config(&config.contracts)?;

    let vault = Arc::new(KeyVault::open(&config.vault)?);
    tracing::info!(path = %vault.storage_path().display(), "Key vault opened");

    let default_identity =
        bootstrap_default_identity(&vault, &config.wallet.private_key_env_var, lookup)?;

    let pool = if config.wallet.pool.enabled {
        let members = provision_pool(&vault, &config.wallet.pool, lookup)?;
        Some(WalletPool::from_config(&config.wallet.pool, members)?)
    } else {
        tracing::info!("Wallet pool disabled");
        None
    };

    let client = Arc::new(BlockchainClient::new(config.blockchain.clone(), &config.gas).await?);
    let dispatcher = Arc::new(Dispatcher::new(
        client.clone(),
        config,
        default_identity,
        pool,
    ));
    let contracts = Contracts::new(addresses, &dispatcher);

    Ok(Relay {
        vault,
        client,
        dispatcher,
        contracts,
    })
}

/// Load the default identity, storing it from the environment on first run.
pub fn bootstrap_default_identity<F>(
    vault: &KeyVault,
    env_var: &str,
    lookup: F,
) -> Result<Identity, StartupError>
where
    F: Fn(&str) -> Option<String>,
{
    if vault.exists(DEFAULT_WALLET_ID) {
        let identity = vault.retrieve(DEFAULT_WALLET_ID)?;
        tracing::info!(address = %identity.address(), "Wallet retrieved from secure storage");
        return Ok(identity);
    }

    let key = lookup(env_var)
        .filter(|k| !k.trim().is_empty())
        .map(Zeroizing::new)
        .ok_or_else(|| StartupError::MissingDefaultKey(env_var.to_string()))?;
    vault.store(DEFAULT_WALLET_ID, key.trim())?;
    let identity = vault.retrieve(DEFAULT_WALLET_ID)?;
    tracing::info!(address = %identity.address(), "Wallet created and stored securely");
    Ok(identity)
}

/// Pool identities `pool-wallet-1..=size`, reusing stored ones and storing
/// keys found under `<prefix><n>`. Missing keys are skipped with a warning,
/// but a pool with no members at all is an error.
pub fn provision_pool<F>(
    vault: &KeyVault,
    config: &PoolConfig,
    lookup: F,
) -> Result<Vec<Identity>, StartupError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut members = Vec::with_capacity(config.size);

    for n in 1..=config.size {
        let id = format!("pool-wallet-{}", n);
        if vault.exists(&id) {
            members.push(vault.retrieve(&id)?);
            continue;
        }

        let var = format!("{}{}", config.private_keys_env_prefix, n);
        match lookup(&var).filter(|k| !k.trim().is_empty()).map(Zeroizing::new) {
            Some(key) => {
                vault.store_identity(&id, key.trim(), true)?;
                members.push(vault.retrieve(&id)?);
            }
            None => tracing::warn!(wallet_id = %id, env_var = %var, "No key for pool wallet"),
        }
    }

    if members.is_empty() {
        return Err(StartupError::EmptyPool {
            prefix: config.private_keys_env_prefix.clone(),
            size: config.size,
        });
    }
    tracing::info!(size = members.len(), "Wallet pool provisioned");
    Ok(members)
}

/// Periodically log pool stats and probe RPC health until shutdown.
pub fn spawn_reporter(
    dispatcher: Arc<Dispatcher<BlockchainClient>>,
    client: Arc<BlockchainClient>,
    interval: Duration,
    shutdown: &Shutdown,
) -> JoinHandle<()> {
    let mut rx = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(stats) = dispatcher.pool_stats() {
                        metrics::record_pool_stats(stats.total, stats.available, stats.in_use);
                        tracing::info!(
                            total = stats.total,
                            available = stats.available,
                            in_use = stats.in_use,
                            "Wallet pool stats"
                        );
                    }
                    if !client.is_healthy().await {
                        tracing::warn!("RPC endpoint unhealthy");
                    }
                }
                _ = rx.recv() => {
                    tracing::debug!("Reporter stopping");
                    break;
                }
            }
        }
    })
}
