//! Contract bindings and invocation wrappers.
//!
//! # Design Decisions
//! - One [`ContractClient`] type serves every contract; wrappers only shape
//!   arguments and pick dispatch options
//! - Every contract address is required; a missing or malformed one fails
//!   construction, and with it startup

pub mod client;
pub mod data_registry;
pub mod dlp;
pub mod tee_pool;

use alloy::primitives::Address;
use std::sync::Arc;

use crate::blockchain::types::ChainRpc;
use crate::config::ContractsConfig;
use crate::dispatch::{DispatchError, Dispatcher};

pub use client::{method_name, parse_address, CallOptions, ContractClient};
pub use data_registry::{DataRegistry, IDataRegistry, Permission};
pub use dlp::{Dlp, IDlp};
pub use tee_pool::{ITeePool, TeePool};

/// Contract addresses, checked before anything else starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub data_registry: Address,
    pub tee_pool: Address,
    pub dlp: Address,
}

impl ContractAddresses {
    /// Every address is required.
    pub fn from_config(config: &ContractsConfig) -> Result<Self, DispatchError> {
        Ok(Self {
            data_registry: parse_address("data_registry", &config.data_registry)?,
            tee_pool: parse_address("tee_pool", &config.tee_pool)?,
            dlp: parse_address("dlp", &config.dlp)?,
        })
    }
}

/// The relay's contract wrappers.
pub struct Contracts<R> {
    data_registry: DataRegistry<R>,
    tee_pool: TeePool<R>,
    dlp: Dlp<R>,
}

impl<R: ChainRpc> Contracts<R> {
    pub fn new(addresses: ContractAddresses, dispatcher: &Arc<Dispatcher<R>>) -> Self {
        let client = |name, address| ContractClient::new(name, address, dispatcher.clone());
        Self {
            data_registry: DataRegistry::new(client("data_registry", addresses.data_registry)),
            tee_pool: TeePool::new(client("tee_pool", addresses.tee_pool)),
            dlp: Dlp::new(client("dlp", addresses.dlp)),
        }
    }

    /// Parse the configured addresses and build every wrapper.
    pub fn from_config(
        config: &ContractsConfig,
        dispatcher: &Arc<Dispatcher<R>>,
    ) -> Result<Self, DispatchError> {
        Ok(Self::new(ContractAddresses::from_config(config)?, dispatcher))
    }

    pub fn data_registry(&self) -> &DataRegistry<R> {
        &self.data_registry
    }

    pub fn tee_pool(&self) -> &TeePool<R> {
        &self.tee_pool
    }

    pub fn dlp(&self) -> &Dlp<R> {
        &self.dlp
    }
}

impl<R> std::fmt::Debug for Contracts<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contracts")
            .field("data_registry", &self.data_registry)
            .field("tee_pool", &self.tee_pool)
            .field("dlp", &self.dlp)
            .finish()
    }
}
