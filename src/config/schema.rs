//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.
//! Monetary amounts are integer wei.

use serde::{Deserialize, Serialize};

/// Root configuration for the transaction relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Network endpoint and confirmation settings.
    pub blockchain: BlockchainConfig,

    /// Signing wallet and wallet pool settings.
    pub wallet: WalletConfig,

    /// Fee ceiling, gas-limit safety margin and RPC retry policy.
    pub gas: GasConfig,

    /// Key vault settings.
    pub vault: VaultConfig,

    /// Deployed contract addresses.
    pub contracts: ContractsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Network the relay is deployed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Local,
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "local" => Ok(Network::Local),
            other => Err(format!("unknown network '{}'", other)),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Local => "local",
        };
        f.write_str(name)
    }
}

/// Blockchain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Network name.
    pub network: Network,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 1337 for a local node).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Number of block confirmations required for finality.
    pub confirmation_blocks: u32,

    /// Maximum time to wait for confirmations in blocking mode.
    pub confirmation_timeout_secs: u64,

    /// Receipt polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// How long settled outcomes are kept in memory, in seconds.
    pub settled_retention_secs: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            network: Network::Local,
            chain_id: 1337,
            rpc_timeout_secs: 10,
            confirmation_blocks: 1,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 2000,
            settled_retention_secs: 600,
        }
    }
}

/// Signing wallet configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Name of the environment variable holding the default wallet key.
    pub private_key_env_var: String,

    /// Gas limit used when estimation is unavailable.
    pub gas_limit: u64,

    /// Static max fee per gas (wei), used when live fee data is unavailable.
    pub max_fee_per_gas: u64,

    /// Static priority fee per gas (wei), used when live fee data is unavailable.
    pub max_priority_fee_per_gas: u64,

    /// Wallet pool settings.
    pub pool: PoolConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env_var: "WALLET_PRIVATE_KEY".to_string(),
            gas_limit: 3_000_000,
            max_fee_per_gas: 50_000_000_000,
            max_priority_fee_per_gas: 1_500_000_000,
            pool: PoolConfig::default(),
        }
    }
}

/// Wallet pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Enable the wallet pool.
    pub enabled: bool,

    /// Number of pool wallets provisioned from the environment.
    pub size: usize,

    /// Total time a dispatch may wait for a free wallet, in milliseconds.
    pub max_wait_ms: u64,

    /// Lock auto-release deadline in milliseconds.
    pub max_acquisition_time_ms: u64,

    /// Delay between acquisition attempts in milliseconds.
    pub retry_delay_ms: u64,

    /// Prefix of the numbered environment variables holding pool keys.
    pub private_keys_env_prefix: String,
}

impl PoolConfig {
    /// Acquisition attempts implied by the wait budget and retry delay.
    pub fn max_attempts(&self) -> u32 {
        if self.retry_delay_ms == 0 {
            return 1;
        }
        let attempts = self.max_wait_ms / self.retry_delay_ms;
        attempts.clamp(1, u32::MAX as u64) as u32
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 5,
            max_wait_ms: 5000,
            max_acquisition_time_ms: 60_000,
            retry_delay_ms: 100,
            private_keys_env_prefix: "WALLET_PRIVATE_KEY_".to_string(),
        }
    }
}

/// Fee and gas policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GasConfig {
    /// Hard ceiling for max fee per gas (wei).
    pub max_gas_price: u64,

    /// Safety multiplier applied to gas estimates (1.2 = 20% buffer).
    pub gas_limit_multiplier: f64,

    /// Retries for RPC reads.
    pub retry_count: u32,

    /// Base delay between RPC read retries in milliseconds.
    pub retry_delay_ms: u64,
}

impl GasConfig {
    /// Gas-limit multiplier as an integer percentage.
    pub fn gas_limit_percent(&self) -> u64 {
        (self.gas_limit_multiplier * 100.0).round().max(0.0) as u64
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            max_gas_price: 100_000_000_000,
            gas_limit_multiplier: 1.2,
            retry_count: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Key vault configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Name of the environment variable holding the master secret.
    pub encryption_key_env_var: String,

    /// Directory holding encrypted identity blobs.
    pub storage_path: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            encryption_key_env_var: "WALLET_ENCRYPTION_KEY".to_string(),
            storage_path: ".wallet-storage".to_string(),
        }
    }
}

/// Deployed contract addresses. Empty means not configured.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ContractsConfig {
    pub data_registry: String,
    pub tee_pool: String,
    pub dlp: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Interval between pool statistics log lines, in seconds.
    pub stats_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            stats_interval_secs: 60,
        }
    }
}
