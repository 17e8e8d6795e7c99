//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides, and validate configuration.
///
/// A missing file is not an error; defaults plus environment are used.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    load_config_with(path, |var| std::env::var(var).ok())
}

/// [`load_config`] with the environment supplied by `lookup`.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<RelayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        Some(path) => {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            RelayConfig::default()
        }
        None => RelayConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment-style overrides on top of a parsed config.
///
/// `lookup` abstracts the environment so overrides are testable.
pub fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var, value })
    }

    if let Some(v) = lookup("BLOCKCHAIN_PROVIDER") {
        config.blockchain.rpc_url = v;
    }
    if let Some(v) = lookup("BLOCKCHAIN_NETWORK") {
        config.blockchain.network = parse("BLOCKCHAIN_NETWORK", v)?;
    }
    if let Some(v) = lookup("BLOCKCHAIN_CHAIN_ID") {
        config.blockchain.chain_id = parse("BLOCKCHAIN_CHAIN_ID", v)?;
    }

    if let Some(v) = lookup("WALLET_PRIVATE_KEY_ENV_VAR") {
        config.wallet.private_key_env_var = v;
    }
    if let Some(v) = lookup("WALLET_GAS_LIMIT") {
        config.wallet.gas_limit = parse("WALLET_GAS_LIMIT", v)?;
    }
    if let Some(v) = lookup("WALLET_MAX_FEE_PER_GAS") {
        config.wallet.max_fee_per_gas = parse("WALLET_MAX_FEE_PER_GAS", v)?;
    }
    if let Some(v) = lookup("WALLET_MAX_PRIORITY_FEE_PER_GAS") {
        config.wallet.max_priority_fee_per_gas = parse("WALLET_MAX_PRIORITY_FEE_PER_GAS", v)?;
    }

    let pool = &mut config.wallet.pool;
    if let Some(v) = lookup("WALLET_POOL_ENABLED") {
        pool.enabled = parse("WALLET_POOL_ENABLED", v)?;
    }
    if let Some(v) = lookup("WALLET_POOL_SIZE") {
        pool.size = parse("WALLET_POOL_SIZE", v)?;
    }
    if let Some(v) = lookup("WALLET_POOL_MAX_WAIT_MS") {
        pool.max_wait_ms = parse("WALLET_POOL_MAX_WAIT_MS", v)?;
    }
    if let Some(v) = lookup("WALLET_POOL_MAX_ACQUISITION_TIME_MS") {
        pool.max_acquisition_time_ms = parse("WALLET_POOL_MAX_ACQUISITION_TIME_MS", v)?;
    }
    if let Some(v) = lookup("WALLET_POOL_PRIVATE_KEYS_ENV_PREFIX") {
        pool.private_keys_env_prefix = v;
    }

    if let Some(v) = lookup("CONTRACT_DATA_REGISTRY_ADDRESS") {
        config.contracts.data_registry = v;
    }
    if let Some(v) = lookup("CONTRACT_TEE_POOL_ADDRESS") {
        config.contracts.tee_pool = v;
    }
    if let Some(v) = lookup("CONTRACT_DLP_ADDRESS") {
        config.contracts.dlp = v;
    }

    if let Some(v) = lookup("GAS_MAX_GAS_PRICE") {
        config.gas.max_gas_price = parse("GAS_MAX_GAS_PRICE", v)?;
    }
    if let Some(v) = lookup("GAS_LIMIT_MULTIPLIER") {
        config.gas.gas_limit_multiplier = parse("GAS_LIMIT_MULTIPLIER", v)?;
    }
    if let Some(v) = lookup("GAS_RETRY_COUNT") {
        config.gas.retry_count = parse("GAS_RETRY_COUNT", v)?;
    }
    if let Some(v) = lookup("GAS_RETRY_DELAY_MS") {
        config.gas.retry_delay_ms = parse("GAS_RETRY_DELAY_MS", v)?;
    }

    if let Some(v) = lookup("WALLET_ENCRYPTION_KEY_ENV_VAR") {
        config.vault.encryption_key_env_var = v;
    }
    if let Some(v) = lookup("WALLET_STORAGE_PATH") {
        config.vault.storage_path = v;
    }

    Ok(())
}
