//! Chain-specific types and error definitions.

use alloy::consensus::TxEnvelope;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::rpc::types::TransactionRequest;
use std::future::Future;
use thiserror::Error;

pub use crate::config::schema::BlockchainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Error payload returned by a node when a call executes and fails.
///
/// Nodes disagree on where they put the revert data, so every location is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionFault {
    /// Top-level error message.
    pub message: String,
    /// Explicit reason string, when the node decodes it itself.
    pub reason: Option<String>,
    /// Explicit data field (text or hex).
    pub data: Option<String>,
    /// Nested error payload (hex-encoded revert bytes).
    pub nested_data: Option<String>,
}

impl std::fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Transaction was not confirmed within expected time.
    #[error("Transaction {tx_hash} not confirmed after {waited_secs} seconds")]
    ConfirmationTimeout { tx_hash: TxHash, waited_secs: u64 },

    /// Node rejected a broadcast (malformed, underpriced, nonce too low, no funds).
    #[error("Broadcast rejected: {0}")]
    Rejected(String),

    /// A call executed and reverted.
    #[error("Execution reverted: {0}")]
    Execution(ExecutionFault),

    /// Transaction could not be assembled or signed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Live fee-market data. `None` components mean the network does not
/// support the fee-market model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

/// Outcome of a mined transaction, as far as the relay cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    pub success: bool,
    pub from: Address,
    pub to: Option<Address>,
}

/// Transaction confirmation status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Broadcast, not yet mined to the required depth.
    Pending,
    /// Mined with the required block depth.
    Confirmed { block_number: u64 },
    /// Reverted, dropped, or replaced.
    Failed(String),
}

impl ConfirmationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationStatus::Pending)
    }
}

/// The subset of a JSON-RPC node the dispatch engine depends on.
///
/// Implemented by [`BlockchainClient`](crate::blockchain::BlockchainClient) for
/// real networks; tests substitute an in-process ledger.
pub trait ChainRpc: Send + Sync + 'static {
    /// Chain ID reported by the node.
    fn chain_id(&self) -> impl Future<Output = BlockchainResult<u64>> + Send;

    /// Latest block number.
    fn block_number(&self) -> impl Future<Output = BlockchainResult<u64>> + Send;

    /// Transaction count for `address`, including unconfirmed transactions.
    fn pending_transaction_count(
        &self,
        address: Address,
    ) -> impl Future<Output = BlockchainResult<u64>> + Send;

    /// Suggested fee-market fees.
    fn fee_data(&self) -> impl Future<Output = BlockchainResult<FeeData>> + Send;

    /// Gas estimate for a call.
    fn estimate_gas(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = BlockchainResult<u64>> + Send;

    /// Broadcast a signed transaction. Never retried.
    fn send_transaction(
        &self,
        envelope: TxEnvelope,
    ) -> impl Future<Output = BlockchainResult<TxHash>> + Send;

    /// Receipt of a mined transaction.
    fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = BlockchainResult<Option<TxReceipt>>> + Send;

    /// Whether the node knows the transaction (mined or in the mempool).
    fn transaction_exists(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = BlockchainResult<bool>> + Send;

    /// Execute a call against the state at `block` without broadcasting.
    fn call_at(
        &self,
        tx: TransactionRequest,
        block: u64,
    ) -> impl Future<Output = BlockchainResult<Bytes>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_conversion() {
        let chain_id = ChainId::from(1u64);
        assert_eq!(chain_id.0, 1);
        assert_eq!(u64::from(chain_id), 1);
    }

    #[test]
    fn test_default_config() {
        let config = BlockchainConfig::default();
        assert_eq!(config.rpc_timeout_secs, 10);
        assert_eq!(config.confirmation_blocks, 1);
    }

    #[test]
    fn test_error_display() {
        let err = BlockchainError::Timeout(10);
        assert_eq!(err.to_string(), "RPC timeout after 10 seconds");

        let err = BlockchainError::Execution(ExecutionFault {
            message: "execution reverted".into(),
            ..Default::default()
        });
        assert_eq!(err.to_string(), "Execution reverted: execution reverted");
    }

    #[test]
    fn test_terminal_status() {
        assert!(!ConfirmationStatus::Pending.is_terminal());
        assert!(ConfirmationStatus::Confirmed { block_number: 1 }.is_terminal());
        assert!(ConfirmationStatus::Failed("x".into()).is_terminal());
    }
}
