//! Contract invocation facade.
//!
//! # Data Flow
//! ```text
//! invoke(request)
//!     → identity: pool lease (use_pool) or the default-identity lane
//!     → nonce.rs (next nonce for the held address)
//!     → gas.rs (fee quote for the tier)
//!     → submitter.rs (sign, broadcast, hand to the watcher)
//!     → identity released
//!     → watcher.rs (background, or awaited by invoke_and_await)
//! ```
//!
//! # Design Decisions
//! - The identity is released on every path before an error propagates
//! - Calls on the default identity are serialized through one lane so the
//!   nonce sequencer always sees an exclusively held address
//! - An on-chain revert is an outcome, not a dispatch error

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::blockchain::types::{BlockchainError, BlockchainResult, ChainRpc, TxReceipt};
use crate::config::RelayConfig;
use crate::dispatch::gas::{FeePolicy, GasStrategy, PriorityTier};
use crate::dispatch::nonce::NonceSequencer;
use crate::dispatch::record::{DispatchRecord, DispatchSink, RecordStatus, TracingSink};
use crate::dispatch::submitter::{Call, GasLimits, Submission, TxSubmitter};
use crate::dispatch::watcher::{Confirmation, ConfirmationWatcher, TxStatus, WatchPolicy};
use crate::observability::metrics;
use crate::pool::{PoolError, PoolStats, WalletPool};
use crate::vault::{Identity, VaultError};

/// Classification callers use to pick a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Vault,
    Exhaustion,
    Broadcast,
    Network,
    Encoding,
    OnChainRevert,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Vault => "vault",
            ErrorKind::Exhaustion => "exhaustion",
            ErrorKind::Broadcast => "broadcast",
            ErrorKind::Network => "network",
            ErrorKind::Encoding => "encoding",
            ErrorKind::OnChainRevert => "on_chain_revert",
        }
    }
}

/// Errors that stop a dispatch before or at broadcast.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("No wallet available after {attempts} attempts")]
    NoWalletAvailable { attempts: u32 },

    #[error("Broadcast failed: {0}")]
    Broadcast(BlockchainError),

    #[error("Network error: {0}")]
    Network(BlockchainError),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Config(_) => ErrorKind::Configuration,
            DispatchError::Vault(_) => ErrorKind::Vault,
            DispatchError::NoWalletAvailable { .. } => ErrorKind::Exhaustion,
            DispatchError::Broadcast(_) => ErrorKind::Broadcast,
            DispatchError::Network(_) => ErrorKind::Network,
            DispatchError::Encoding(_) => ErrorKind::Encoding,
        }
    }
}

impl From<PoolError> for DispatchError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::NoWalletAvailable { attempts } => {
                DispatchError::NoWalletAvailable { attempts }
            }
            PoolError::DuplicateMember(id) => {
                DispatchError::Config(format!("duplicate pool member {}", id))
            }
        }
    }
}

/// Sort a submit failure into broadcast vs. network.
fn classify(err: BlockchainError) -> DispatchError {
    match err {
        BlockchainError::Rpc(_)
        | BlockchainError::Timeout(_)
        | BlockchainError::ConfirmationTimeout { .. } => DispatchError::Network(err),
        BlockchainError::ChainMismatch { .. } => DispatchError::Config(err.to_string()),
        BlockchainError::Rejected(_)
        | BlockchainError::Execution(_)
        | BlockchainError::Signing(_) => DispatchError::Broadcast(err),
    }
}

/// One contract call to dispatch.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub to: Address,
    /// Method name, for records and metrics.
    pub method: String,
    /// ABI-encoded calldata.
    pub calldata: Bytes,
    pub value: U256,
    pub tier: PriorityTier,
    pub use_pool: bool,
    /// Caller-shaped arguments, kept on the dispatch record.
    pub params: serde_json::Value,
}

impl InvokeRequest {
    pub fn new(to: Address, method: impl Into<String>, calldata: impl Into<Bytes>) -> Self {
        Self {
            to,
            method: method.into(),
            calldata: calldata.into(),
            value: U256::ZERO,
            tier: PriorityTier::default(),
            use_pool: false,
            params: serde_json::Value::Null,
        }
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn tier(mut self, tier: PriorityTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn use_pool(mut self, use_pool: bool) -> Self {
        self.use_pool = use_pool;
        self
    }

    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// Result of a dispatch that waited for its transaction to settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub record_id: Uuid,
    pub tx_hash: TxHash,
    pub confirmation: Confirmation,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.confirmation.is_success()
    }

    pub fn receipt(&self) -> Option<&TxReceipt> {
        self.confirmation.receipt()
    }

    /// Decoded revert reason for a failed transaction.
    pub fn reason(&self) -> Option<&str> {
        match &self.confirmation {
            Confirmation::Failed { reason, .. } => Some(reason),
            Confirmation::Confirmed(_) => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        (!self.is_success()).then_some(ErrorKind::OnChainRevert)
    }
}

/// Pool acquisition settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Acquire {
    attempts: u32,
    retry_delay: Duration,
}

/// Orchestrates identity selection, fees, nonces, broadcast and tracking.
pub struct Dispatcher<R> {
    chain_id: u64,
    default_identity: Identity,
    default_lane: Mutex<()>,
    pool: Option<WalletPool>,
    acquire: Acquire,
    nonces: NonceSequencer<R>,
    gas: GasStrategy<R>,
    submitter: TxSubmitter<R>,
    watcher: Arc<ConfirmationWatcher<R>>,
    sink: Arc<dyn DispatchSink>,
}

impl<R: ChainRpc> Dispatcher<R> {
    /// Wire up the dispatch pipeline over `rpc`.
    ///
    /// `pool` is `None` when the wallet pool is disabled; pooled requests then
    /// run on the default identity.
    pub fn new(
        rpc: Arc<R>,
        config: &RelayConfig,
        default_identity: Identity,
        pool: Option<WalletPool>,
    ) -> Self {
        let chain_id = config.blockchain.chain_id;
        let watcher = Arc::new(ConfirmationWatcher::new(
            rpc.clone(),
            WatchPolicy::from_config(&config.blockchain),
        ));
        let submitter = TxSubmitter::new(
            rpc.clone(),
            watcher.clone(),
            chain_id,
            GasLimits {
                fallback: config.wallet.gas_limit,
                multiplier_percent: config.gas.gas_limit_percent(),
            },
        );

        Self {
            chain_id,
            default_identity,
            default_lane: Mutex::new(()),
            pool,
            acquire: Acquire {
                attempts: config.wallet.pool.max_attempts(),
                retry_delay: Duration::from_millis(config.wallet.pool.retry_delay_ms),
            },
            nonces: NonceSequencer::new(rpc.clone()),
            gas: GasStrategy::new(rpc, FeePolicy::from_config(&config.wallet, &config.gas)),
            submitter,
            watcher,
            sink: Arc::new(TracingSink),
        }
    }

    /// Send record transitions to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn DispatchSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn default_identity(&self) -> &Identity {
        &self.default_identity
    }

    pub fn pool(&self) -> Option<&WalletPool> {
        self.pool.as_ref()
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(WalletPool::stats)
    }

    pub fn watcher(&self) -> &Arc<ConfirmationWatcher<R>> {
        &self.watcher
    }

    pub fn nonces(&self) -> &NonceSequencer<R> {
        &self.nonces
    }

    /// Buffered gas estimate for a call from the default identity.
    pub async fn estimate_gas(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> BlockchainResult<u64> {
        let call = Call::new(to, data).with_value(value);
        self.submitter
            .estimate_gas(self.default_identity.address(), &call)
            .await
    }

    pub async fn transaction_status(&self, tx_hash: TxHash) -> BlockchainResult<TxStatus> {
        self.watcher.transaction_status(tx_hash).await
    }

    /// Dispatch and return once broadcast. The confirmation is tracked in the
    /// background and lands on the dispatch record.
    pub async fn invoke(&self, request: InvokeRequest) -> Result<TxHash, DispatchError> {
        let (record, submission) = self.start(&request).await?;
        let tx_hash = submission.tx_hash;

        let sink = self.sink.clone();
        self.watcher.spawn_watch(tx_hash, move |confirmation| {
            let mut record = record;
            settle_record(&mut record, confirmation, sink.as_ref());
        });

        Ok(tx_hash)
    }

    /// Dispatch and wait for the transaction to settle.
    ///
    /// A revert is returned as a failed outcome carrying the decoded reason.
    pub async fn invoke_and_await(
        &self,
        request: InvokeRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (mut record, submission) = self.start(&request).await?;

        let confirmation = self
            .watcher
            .await_confirmation(submission.tx_hash)
            .await
            .map_err(classify)?;
        settle_record(&mut record, &confirmation, self.sink.as_ref());

        Ok(DispatchOutcome {
            record_id: record.id,
            tx_hash: submission.tx_hash,
            confirmation,
        })
    }

    /// Run the pipeline up to broadcast, emitting record transitions.
    async fn start(
        &self,
        request: &InvokeRequest,
    ) -> Result<(DispatchRecord, Submission), DispatchError> {
        let started = Instant::now();
        let mut record = DispatchRecord::new(&request.method, self.chain_id, request.params.clone());
        self.sink.record(&record);

        match self.dispatch(request).await {
            Ok(submission) => {
                record.broadcast(
                    submission.tx_hash,
                    serde_json::json!({
                        "wallet_id": submission.wallet_id,
                        "from": submission.from,
                        "nonce": submission.nonce,
                        "gas_limit": submission.gas_limit,
                        "tier": request.tier,
                    }),
                );
                self.sink.record(&record);
                metrics::record_dispatch(&request.method, "broadcast", started);
                Ok((record, submission))
            }
            Err(e) => {
                tracing::error!(
                    method = %request.method,
                    to = %request.to,
                    kind = e.kind().as_str(),
                    error = %e,
                    "Dispatch failed"
                );
                record.settle(RecordStatus::Failed, Some(e.to_string()));
                self.sink.record(&record);
                metrics::record_dispatch(&request.method, e.kind().as_str(), started);
                Err(e)
            }
        }
    }

    async fn dispatch(&self, request: &InvokeRequest) -> Result<Submission, DispatchError> {
        let call = Call::new(request.to, request.calldata.clone()).with_value(request.value);

        match (&self.pool, request.use_pool) {
            (Some(pool), true) => {
                let lease = pool
                    .acquire(self.acquire.attempts, self.acquire.retry_delay)
                    .await?;
                // The lease drops at the end of this arm, success or not.
                self.send(lease.identity(), &call, request.tier).await
            }
            (pool, use_pool) => {
                if use_pool && pool.is_none() {
                    tracing::warn!(method = %request.method, "Wallet pool not enabled, using default wallet");
                }
                let _lane = self.default_lane.lock().await;
                self.send(&self.default_identity, &call, request.tier).await
            }
        }
    }

    async fn send(
        &self,
        identity: &Identity,
        call: &Call,
        tier: PriorityTier,
    ) -> Result<Submission, DispatchError> {
        let address = identity.address();
        let nonce = self
            .nonces
            .next(address)
            .await
            .map_err(DispatchError::Network)?;
        let fees = self.gas.quote(tier).await;

        match self.submitter.submit(identity, call, nonce, fees).await {
            Ok(submission) => Ok(submission),
            Err(e) => {
                self.nonces.give_back(address, nonce);
                Err(classify(e))
            }
        }
    }
}

fn settle_record(record: &mut DispatchRecord, confirmation: &Confirmation, sink: &dyn DispatchSink) {
    let changed = match confirmation {
        Confirmation::Confirmed(_) => record.settle(RecordStatus::Success, None),
        Confirmation::Failed { reason, .. } => {
            record.settle(RecordStatus::Failed, Some(reason.clone()))
        }
    };
    if changed {
        sink.record(record);
    }
}

impl<R> std::fmt::Debug for Dispatcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("chain_id", &self.chain_id)
            .field("default_identity", &self.default_identity)
            .field("pool", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}
