//! Confirmation tracking and revert decoding.
//!
//! # State Machine
//! ```text
//! track() → Pending → Confirmed (receipt succeeded, depth reached)
//!                   → Failed    (reverted, dropped or replaced)
//! ```
//! Terminal states are final: a settled transaction is never polled again.
//! Settled outcomes are kept for the retention window only; after that,
//! status lookups go to the ledger.

use alloy::hex;
use alloy::primitives::TxHash;
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::{Panic, Revert, SolError};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::blockchain::types::{
    BlockchainError, BlockchainResult, ChainRpc, ConfirmationStatus, ExecutionFault, TxReceipt,
};
use crate::config::BlockchainConfig;
use crate::observability::metrics;

const DROPPED: &str = "transaction dropped or replaced";
const REVERTED: &str = "transaction reverted";

/// Terminal outcome of a tracked transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed(TxReceipt),
    Failed {
        reason: String,
        receipt: Option<TxReceipt>,
    },
}

impl Confirmation {
    pub fn is_success(&self) -> bool {
        matches!(self, Confirmation::Confirmed(_))
    }

    pub fn receipt(&self) -> Option<&TxReceipt> {
        match self {
            Confirmation::Confirmed(receipt) => Some(receipt),
            Confirmation::Failed { receipt, .. } => receipt.as_ref(),
        }
    }

    pub fn status(&self) -> ConfirmationStatus {
        match self {
            Confirmation::Confirmed(receipt) => ConfirmationStatus::Confirmed {
                block_number: receipt.block_number,
            },
            Confirmation::Failed { reason, .. } => ConfirmationStatus::Failed(reason.clone()),
        }
    }
}

/// Coarse status for lookups by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
    NotFound,
}

/// Watch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPolicy {
    pub confirmations: u64,
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// How long settled outcomes stay in memory.
    pub retention: Duration,
}

impl WatchPolicy {
    pub fn from_config(config: &BlockchainConfig) -> Self {
        Self {
            confirmations: u64::from(config.confirmation_blocks.max(1)),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            timeout: Duration::from_secs(config.confirmation_timeout_secs),
            retention: Duration::from_secs(config.settled_retention_secs),
        }
    }
}

/// Tracks broadcast transactions until they settle.
#[derive(Debug)]
pub struct ConfirmationWatcher<R> {
    rpc: Arc<R>,
    policy: WatchPolicy,
    /// Broadcast, unsettled transactions with the call to replay on revert.
    pending: DashMap<TxHash, TransactionRequest>,
    settled: DashMap<TxHash, Settled>,
    last_prune: Mutex<Instant>,
}

#[derive(Debug)]
struct Settled {
    outcome: Confirmation,
    at: Instant,
}

impl<R: ChainRpc> ConfirmationWatcher<R> {
    pub fn new(rpc: Arc<R>, policy: WatchPolicy) -> Self {
        Self {
            rpc,
            policy,
            pending: DashMap::new(),
            settled: DashMap::new(),
            last_prune: Mutex::new(Instant::now()),
        }
    }

    pub fn policy(&self) -> &WatchPolicy {
        &self.policy
    }

    /// Start tracking a broadcast transaction.
    pub fn track(&self, tx_hash: TxHash, call: TransactionRequest) {
        if !self.settled.contains_key(&tx_hash) {
            self.pending.insert(tx_hash, call);
        }
    }

    /// Local view of a transaction, if tracked.
    pub fn status(&self, tx_hash: &TxHash) -> Option<ConfirmationStatus> {
        if let Some(settled) = self.settled.get(tx_hash) {
            return Some(settled.outcome.status());
        }
        self.pending
            .contains_key(tx_hash)
            .then_some(ConfirmationStatus::Pending)
    }

    /// Settled outcome, if any.
    pub fn outcome(&self, tx_hash: &TxHash) -> Option<Confirmation> {
        self.settled.get(tx_hash).map(|s| s.outcome.clone())
    }

    /// Status from the local tracker, falling back to the ledger.
    pub async fn transaction_status(&self, tx_hash: TxHash) -> BlockchainResult<TxStatus> {
        match self.status(&tx_hash) {
            Some(ConfirmationStatus::Pending) => {}
            Some(ConfirmationStatus::Confirmed { .. }) => return Ok(TxStatus::Confirmed),
            Some(ConfirmationStatus::Failed(_)) => return Ok(TxStatus::Failed),
            None => {}
        }

        if let Some(receipt) = self.rpc.transaction_receipt(tx_hash).await? {
            return Ok(if receipt.success {
                TxStatus::Confirmed
            } else {
                TxStatus::Failed
            });
        }
        if self.rpc.transaction_exists(tx_hash).await? {
            Ok(TxStatus::Pending)
        } else {
            Ok(TxStatus::NotFound)
        }
    }

    /// Wait until `tx_hash` settles or the watch times out.
    ///
    /// On timeout a transaction the node no longer knows is settled as
    /// dropped; one still known stays pending and the timeout is returned.
    pub async fn await_confirmation(&self, tx_hash: TxHash) -> BlockchainResult<Confirmation> {
        if let Some(outcome) = self.outcome(&tx_hash) {
            return Ok(outcome);
        }

        match timeout(self.policy.timeout, self.poll(tx_hash)).await {
            Ok(result) => result,
            Err(_) => {
                if !self.rpc.transaction_exists(tx_hash).await? {
                    tracing::warn!(tx_hash = %tx_hash, "Transaction no longer known to the node");
                    return Ok(self.settle(
                        tx_hash,
                        Confirmation::Failed {
                            reason: DROPPED.to_string(),
                            receipt: None,
                        },
                    ));
                }
                // Nothing polls this hash again; the ledger answers from here on.
                self.pending.remove(&tx_hash);
                Err(BlockchainError::ConfirmationTimeout {
                    tx_hash,
                    waited_secs: self.policy.timeout.as_secs(),
                })
            }
        }
    }

    /// Watch `tx_hash` in the background and hand the outcome to
    /// `on_settled`. A watch that times out is logged and dropped.
    pub fn spawn_watch<F>(
        self: &Arc<Self>,
        tx_hash: TxHash,
        on_settled: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(&Confirmation) + Send + 'static,
    {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            match watcher.await_confirmation(tx_hash).await {
                Ok(confirmation) => on_settled(&confirmation),
                Err(e) => {
                    tracing::warn!(tx_hash = %tx_hash, error = %e, "Confirmation not observed")
                }
            }
        })
    }

    /// Settled outcomes currently held in memory.
    pub fn settled_len(&self) -> usize {
        self.settled.len()
    }

    async fn poll(&self, tx_hash: TxHash) -> BlockchainResult<Confirmation> {
        let mut ticker = interval(self.policy.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let receipt = match self.rpc.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => receipt,
                Ok(None) => {
                    tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(tx_hash = %tx_hash, error = %e, "Receipt lookup failed");
                    continue;
                }
            };

            if !receipt.success {
                let reason = self.revert_reason(tx_hash, receipt.block_number).await;
                tracing::info!(tx_hash = %tx_hash, reason = %reason, "Transaction reverted");
                return Ok(self.settle(
                    tx_hash,
                    Confirmation::Failed {
                        reason,
                        receipt: Some(receipt),
                    },
                ));
            }

            let current = match self.rpc.block_number().await {
                Ok(current) => current,
                Err(e) => {
                    tracing::debug!(tx_hash = %tx_hash, error = %e, "Block number lookup failed");
                    continue;
                }
            };
            let depth = current.saturating_sub(receipt.block_number) + 1;
            if depth >= self.policy.confirmations {
                tracing::info!(
                    tx_hash = %tx_hash,
                    block_number = receipt.block_number,
                    gas_used = receipt.gas_used,
                    "Transaction confirmed"
                );
                return Ok(self.settle(tx_hash, Confirmation::Confirmed(receipt)));
            }

            tracing::debug!(
                tx_hash = %tx_hash,
                confirmations = depth,
                required = self.policy.confirmations,
                "Waiting for confirmations"
            );
        }
    }

    /// Record a terminal outcome. The first outcome wins.
    fn settle(&self, tx_hash: TxHash, outcome: Confirmation) -> Confirmation {
        self.prune();
        let entry = self.settled.entry(tx_hash).or_insert_with(|| {
            metrics::record_confirmation(if outcome.is_success() {
                "confirmed"
            } else {
                "failed"
            });
            Settled {
                outcome,
                at: Instant::now(),
            }
        });
        let settled = entry.value().outcome.clone();
        drop(entry);
        self.pending.remove(&tx_hash);
        settled
    }

    /// Drop settled outcomes older than the retention window. Runs at most
    /// once per quarter window.
    fn prune(&self) {
        let retention = self.policy.retention;
        {
            let mut last = self.last_prune.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed() < retention / 4 {
                return;
            }
            *last = Instant::now();
        }
        let before = self.settled.len();
        self.settled.retain(|_, s| s.at.elapsed() < retention);
        let evicted = before.saturating_sub(self.settled.len());
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted settled outcomes");
        }
    }

    /// Replay the call at the block it was mined in to recover the reason.
    async fn revert_reason(&self, tx_hash: TxHash, block: u64) -> String {
        let Some(call) = self.pending.get(&tx_hash).map(|c| c.clone()) else {
            return REVERTED.to_string();
        };
        match self.rpc.call_at(call, block).await {
            Err(BlockchainError::Execution(fault)) => decode_revert(&fault),
            Err(e) => e.to_string(),
            Ok(output) => decode_revert_bytes(&output).unwrap_or_else(|| REVERTED.to_string()),
        }
    }
}

/// Best readable reason from a node's execution fault.
///
/// Tries the explicit reason, then the data field, then the nested payload,
/// and finally the raw message.
pub fn decode_revert(fault: &ExecutionFault) -> String {
    if let Some(reason) = fault.reason.as_deref().filter(|r| !r.is_empty()) {
        return reason.to_string();
    }

    if let Some(data) = fault.data.as_deref().filter(|d| !d.is_empty()) {
        return match hex::decode(data) {
            Ok(bytes) => decode_revert_bytes(&bytes).unwrap_or_else(|| data.to_string()),
            Err(_) => data.to_string(),
        };
    }

    if let Some(reason) = fault
        .nested_data
        .as_deref()
        .and_then(|nested| hex::decode(nested).ok())
        .and_then(|bytes| decode_revert_bytes(&bytes))
    {
        return reason;
    }

    fault.message.clone()
}

/// Decode revert bytes: `Error(string)`, `Panic(uint256)`, or text behind a
/// 4-byte selector.
pub fn decode_revert_bytes(bytes: &[u8]) -> Option<String> {
    if let Ok(revert) = Revert::abi_decode(bytes) {
        return Some(revert.reason);
    }
    if let Ok(panic) = Panic::abi_decode(bytes) {
        return Some(format!("panic code {}", panic.code));
    }

    let body = bytes.get(4..)?;
    let text = String::from_utf8_lossy(body);
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!text.is_empty() && !text.contains('\u{FFFD}')).then(|| text.to_string())
}
