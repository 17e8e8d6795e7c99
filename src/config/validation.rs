//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, chain id set, fee ordering)
//! - Check that configured addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use alloy::primitives::Address;
use thiserror::Error;

use crate::config::schema::RelayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.blockchain.rpc_url.trim().is_empty() {
        errors.push(ValidationError::new("blockchain.rpc_url", "RPC endpoint is required"));
    } else if let Err(e) = config.blockchain.rpc_url.parse::<url::Url>() {
        errors.push(ValidationError::new(
            "blockchain.rpc_url",
            format!("invalid URL '{}': {}", config.blockchain.rpc_url, e),
        ));
    }

    for url in &config.blockchain.failover_urls {
        if url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new(
                "blockchain.failover_urls",
                format!("invalid URL '{}'", url),
            ));
        }
    }

    if config.blockchain.chain_id == 0 {
        errors.push(ValidationError::new("blockchain.chain_id", "must be greater than 0"));
    }
    if config.blockchain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("blockchain.rpc_timeout_secs", "must be greater than 0"));
    }
    if config.blockchain.poll_interval_ms == 0 {
        errors.push(ValidationError::new("blockchain.poll_interval_ms", "must be greater than 0"));
    }

    let wallet = &config.wallet;
    if wallet.private_key_env_var.trim().is_empty() {
        errors.push(ValidationError::new("wallet.private_key_env_var", "must not be empty"));
    }
    if wallet.gas_limit == 0 {
        errors.push(ValidationError::new("wallet.gas_limit", "must be greater than 0"));
    }
    if wallet.max_priority_fee_per_gas > wallet.max_fee_per_gas {
        errors.push(ValidationError::new(
            "wallet.max_priority_fee_per_gas",
            "must not exceed wallet.max_fee_per_gas",
        ));
    }
    if wallet.max_fee_per_gas > config.gas.max_gas_price {
        errors.push(ValidationError::new(
            "wallet.max_fee_per_gas",
            "must not exceed gas.max_gas_price",
        ));
    }

    if wallet.pool.enabled {
        if wallet.pool.size == 0 {
            errors.push(ValidationError::new("wallet.pool.size", "must be greater than 0"));
        }
        if wallet.pool.max_acquisition_time_ms == 0 {
            errors.push(ValidationError::new(
                "wallet.pool.max_acquisition_time_ms",
                "must be greater than 0",
            ));
        }
        if wallet.pool.private_keys_env_prefix.trim().is_empty() {
            errors.push(ValidationError::new(
                "wallet.pool.private_keys_env_prefix",
                "must not be empty",
            ));
        }
    }

    if config.gas.gas_limit_multiplier < 1.0 {
        errors.push(ValidationError::new("gas.gas_limit_multiplier", "must be at least 1.0"));
    }

    if config.vault.encryption_key_env_var.trim().is_empty() {
        errors.push(ValidationError::new("vault.encryption_key_env_var", "must not be empty"));
    }
    if config.vault.storage_path.trim().is_empty() {
        errors.push(ValidationError::new("vault.storage_path", "must not be empty"));
    }

    for (field, value) in [
        ("contracts.data_registry", &config.contracts.data_registry),
        ("contracts.tee_pool", &config.contracts.tee_pool),
        ("contracts.dlp", &config.contracts.dlp),
    ] {
        if !value.is_empty() && value.parse::<Address>().is_err() {
            errors.push(ValidationError::new(field, format!("invalid address '{}'", value)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
