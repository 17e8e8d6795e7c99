//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch engine
//!     → types.rs (ChainRpc: the node surface the engine depends on)
//!     → client.rs (alloy HTTP providers with timeout, failover, retry)
//!     → JSON-RPC endpoint
//! ```
//!
//! # Security Constraints
//! - Private keys never reach this layer; envelopes arrive signed
//! - All RPC calls have configurable timeouts
//! - Broadcasts are never retried
//! - Graceful degradation when blockchain unreachable

pub mod client;
pub mod types;

pub use client::BlockchainClient;
pub use types::{
    BlockchainConfig, BlockchainError, BlockchainResult, ChainId, ChainRpc, ConfirmationStatus,
    ExecutionFault, FeeData, TxReceipt,
};
