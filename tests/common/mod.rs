//! Shared utilities for integration tests: an in-process ledger that speaks
//! the `ChainRpc` surface.

#![allow(dead_code)]

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{Revert, SolError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tx_relay::blockchain::{
    BlockchainError, BlockchainResult, ChainRpc, ExecutionFault, FeeData, TxReceipt,
};
use tx_relay::config::RelayConfig;
use tx_relay::dispatch::{Dispatcher, MemoryRecords};
use tx_relay::pool::WalletPool;
use tx_relay::vault::Identity;

pub const GWEI: u128 = 1_000_000_000;

/// Ledger double. Transactions are mined on broadcast unless auto-mining is
/// switched off; calls to addresses registered as reverting fail with a
/// standard `Error(string)` payload.
#[derive(Debug)]
pub struct MockChain {
    chain_id: u64,
    block: AtomicU64,
    auto_mine: AtomicBool,
    send_delay_ms: AtomicU64,
    pending_counts: Mutex<HashMap<Address, u64>>,
    fees: Mutex<Result<FeeData, String>>,
    estimate: Mutex<Result<u64, String>>,
    reject_next: Mutex<Option<String>>,
    reverting: Mutex<HashMap<Address, String>>,
    sent: Mutex<Vec<TxEnvelope>>,
    receipts: Mutex<HashMap<TxHash, TxReceipt>>,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            block: AtomicU64::new(100),
            auto_mine: AtomicBool::new(true),
            send_delay_ms: AtomicU64::new(0),
            pending_counts: Mutex::new(HashMap::new()),
            fees: Mutex::new(Ok(FeeData {
                max_fee_per_gas: Some(20 * GWEI),
                max_priority_fee_per_gas: Some(GWEI),
            })),
            estimate: Mutex::new(Ok(50_000)),
            reject_next: Mutex::new(None),
            reverting: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_pending_count(&self, address: Address, count: u64) {
        self.pending_counts.lock().unwrap().insert(address, count);
    }

    pub fn set_fees(&self, fees: Result<FeeData, String>) {
        *self.fees.lock().unwrap() = fees;
    }

    pub fn set_estimate(&self, estimate: Result<u64, String>) {
        *self.estimate.lock().unwrap() = estimate;
    }

    pub fn set_auto_mine(&self, on: bool) {
        self.auto_mine.store(on, Ordering::SeqCst);
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.send_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Reject the next broadcast with `message`.
    pub fn reject_next(&self, message: &str) {
        *self.reject_next.lock().unwrap() = Some(message.to_string());
    }

    /// Every call to `to` reverts with `reason`.
    pub fn revert_calls_to(&self, to: Address, reason: &str) {
        self.reverting
            .lock()
            .unwrap()
            .insert(to, reason.to_string());
    }

    pub fn sent(&self) -> Vec<TxEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_nonces(&self) -> Vec<u64> {
        self.sent().iter().map(|tx| tx.nonce()).collect()
    }

    /// Forget a broadcast transaction, as if it was dropped from the mempool.
    pub fn drop_transaction(&self, tx_hash: TxHash) {
        self.sent.lock().unwrap().retain(|tx| *tx.tx_hash() != tx_hash);
        self.receipts.lock().unwrap().remove(&tx_hash);
    }

    fn revert_fault(reason: &str) -> BlockchainError {
        let payload = Revert {
            reason: reason.to_string(),
        }
        .abi_encode();
        BlockchainError::Execution(ExecutionFault {
            message: "execution reverted".to_string(),
            reason: None,
            data: None,
            nested_data: Some(alloy::hex::encode_prefixed(payload)),
        })
    }

    fn reverts(&self, to: Option<Address>) -> Option<String> {
        let to = to?;
        self.reverting.lock().unwrap().get(&to).cloned()
    }
}

impl ChainRpc for MockChain {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn pending_transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        Ok(self
            .pending_counts
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or(0))
    }

    async fn fee_data(&self) -> BlockchainResult<FeeData> {
        self.fees
            .lock()
            .unwrap()
            .clone()
            .map_err(BlockchainError::Rpc)
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> BlockchainResult<u64> {
        if let Some(reason) = self.reverts(tx.to.and_then(|kind| kind.to().copied())) {
            return Err(Self::revert_fault(&reason));
        }
        self.estimate
            .lock()
            .unwrap()
            .clone()
            .map_err(BlockchainError::Rpc)
    }

    async fn send_transaction(&self, envelope: TxEnvelope) -> BlockchainResult<TxHash> {
        let delay = self.send_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(message) = self.reject_next.lock().unwrap().take() {
            return Err(BlockchainError::Rejected(message));
        }

        let tx_hash = *envelope.tx_hash();
        let to = envelope.to();
        let success = self.reverts(to).is_none();
        self.sent.lock().unwrap().push(envelope);

        if self.auto_mine.load(Ordering::SeqCst) {
            let block_number = self.block.fetch_add(1, Ordering::SeqCst) + 1;
            self.receipts.lock().unwrap().insert(
                tx_hash,
                TxReceipt {
                    tx_hash,
                    block_number,
                    gas_used: 21_000,
                    success,
                    from: Address::ZERO,
                    to,
                },
            );
        }
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn transaction_exists(&self, tx_hash: TxHash) -> BlockchainResult<bool> {
        Ok(self
            .sent
            .lock()
            .unwrap()
            .iter()
            .any(|tx| *tx.tx_hash() == tx_hash))
    }

    async fn call_at(&self, tx: TransactionRequest, _block: u64) -> BlockchainResult<Bytes> {
        match self.reverts(tx.to.and_then(|kind| kind.to().copied())) {
            Some(reason) => Err(Self::revert_fault(&reason)),
            None => Ok(Bytes::new()),
        }
    }
}

/// Config tuned for fast tests.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.blockchain.chain_id = 1337;
    config.blockchain.poll_interval_ms = 10;
    config.blockchain.confirmation_timeout_secs = 5;
    config.wallet.pool.max_wait_ms = 10_000;
    config.wallet.pool.retry_delay_ms = 10;
    config
}

pub fn identity(id: &str) -> Identity {
    Identity::new(id, PrivateKeySigner::random())
}

/// Pool of `size` fresh identities using the config's lease timeout.
pub fn pool(config: &RelayConfig, size: usize) -> WalletPool {
    let members = (1..=size)
        .map(|n| identity(&format!("pool-wallet-{}", n)))
        .collect();
    WalletPool::from_config(&config.wallet.pool, members).unwrap()
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub dispatcher: Arc<Dispatcher<MockChain>>,
    pub records: Arc<MemoryRecords>,
}

/// Dispatcher over a fresh mock chain. `pool_size` of `None` disables the pool.
pub fn harness(config: RelayConfig, pool_size: Option<usize>) -> Harness {
    let chain = MockChain::new(config.blockchain.chain_id);
    let records = Arc::new(MemoryRecords::new());
    let pool = pool_size.map(|n| pool(&config, n));
    let dispatcher = Dispatcher::new(chain.clone(), &config, identity("default"), pool)
        .with_sink(records.clone());
    Harness {
        chain,
        dispatcher: Arc::new(dispatcher),
        records,
    }
}
