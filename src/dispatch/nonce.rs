//! Per-address nonce sequencing.
//!
//! # Precondition
//! The sequencer takes `max(ledger pending count, local high-water mark)` on
//! every allocation. That is only correct while this process is the sole
//! signer for the address and callers hold the address exclusively (a pool
//! lease or the default-identity lane) from `next` until broadcast. A second
//! signer for the same address will cause nonce collisions.

use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::blockchain::types::{BlockchainResult, ChainRpc};

/// Issues strictly increasing nonces per address.
#[derive(Debug)]
pub struct NonceSequencer<R> {
    rpc: Arc<R>,
    /// Next nonce to issue per address (last issued + 1).
    next: Mutex<HashMap<Address, u64>>,
}

impl<R: ChainRpc> NonceSequencer<R> {
    pub fn new(rpc: Arc<R>) -> Self {
        Self {
            rpc,
            next: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate the next nonce for `address`.
    pub async fn next(&self, address: Address) -> BlockchainResult<u64> {
        let ledger = self.rpc.pending_transaction_count(address).await?;

        let mut map = self.next.lock().unwrap_or_else(|e| e.into_inner());
        let local = map.get(&address).copied().unwrap_or(0);
        let nonce = ledger.max(local);
        map.insert(address, nonce + 1);

        tracing::debug!(address = %address, nonce, ledger, local, "Nonce allocated");
        Ok(nonce)
    }

    /// Return an unused nonce after a failed broadcast.
    ///
    /// Only rewinds when `nonce` is the latest one issued for `address`.
    pub fn give_back(&self, address: Address, nonce: u64) -> bool {
        let mut map = self.next.lock().unwrap_or_else(|e| e.into_inner());
        match map.get_mut(&address) {
            Some(next) if *next == nonce + 1 => {
                *next = nonce;
                tracing::debug!(address = %address, nonce, "Nonce returned");
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::{BlockchainError, FeeData, TxReceipt};
    use alloy::consensus::TxEnvelope;
    use alloy::primitives::{Bytes, TxHash};
    use alloy::rpc::types::TransactionRequest;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Ledger that only answers pending counts.
    #[derive(Default)]
    struct Counts(AtomicU64);

    impl ChainRpc for Counts {
        async fn chain_id(&self) -> BlockchainResult<u64> {
            Ok(1337)
        }
        async fn block_number(&self) -> BlockchainResult<u64> {
            Ok(0)
        }
        async fn pending_transaction_count(&self, _: Address) -> BlockchainResult<u64> {
            Ok(self.0.load(Ordering::SeqCst))
        }
        async fn fee_data(&self) -> BlockchainResult<FeeData> {
            Ok(FeeData::default())
        }
        async fn estimate_gas(&self, _: TransactionRequest) -> BlockchainResult<u64> {
            Err(BlockchainError::Rpc("unsupported".into()))
        }
        async fn send_transaction(&self, _: TxEnvelope) -> BlockchainResult<TxHash> {
            Err(BlockchainError::Rpc("unsupported".into()))
        }
        async fn transaction_receipt(&self, _: TxHash) -> BlockchainResult<Option<TxReceipt>> {
            Ok(None)
        }
        async fn transaction_exists(&self, _: TxHash) -> BlockchainResult<bool> {
            Ok(false)
        }
        async fn call_at(&self, _: TransactionRequest, _: u64) -> BlockchainResult<Bytes> {
            Ok(Bytes::new())
        }
    }

    const ADDR: Address = Address::repeat_byte(0x11);

    #[tokio::test]
    async fn test_local_ahead_of_ledger() {
        let rpc = Arc::new(Counts::default());
        rpc.0.store(5, Ordering::SeqCst);
        let seq = NonceSequencer::new(rpc.clone());

        assert_eq!(seq.next(ADDR).await.unwrap(), 5);
        // ledger has not seen nonce 5 yet
        assert_eq!(seq.next(ADDR).await.unwrap(), 6);
        assert_eq!(seq.next(ADDR).await.unwrap(), 7);
        assert_eq!(seq.next(ADDR).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_ledger_ahead_of_local() {
        let rpc = Arc::new(Counts::default());
        let seq = NonceSequencer::new(rpc.clone());

        assert_eq!(seq.next(ADDR).await.unwrap(), 0);
        // another restart or an external send moved the ledger
        rpc.0.store(10, Ordering::SeqCst);
        assert_eq!(seq.next(ADDR).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_give_back_latest_only() {
        let rpc = Arc::new(Counts::default());
        let seq = NonceSequencer::new(rpc);

        let a = seq.next(ADDR).await.unwrap();
        let b = seq.next(ADDR).await.unwrap();
        assert!(!seq.give_back(ADDR, a));
        assert!(seq.give_back(ADDR, b));
        assert_eq!(seq.next(ADDR).await.unwrap(), b);
    }

    #[tokio::test]
    async fn test_addresses_are_independent() {
        let rpc = Arc::new(Counts::default());
        let seq = NonceSequencer::new(rpc);
        let other = Address::repeat_byte(0x22);

        assert_eq!(seq.next(ADDR).await.unwrap(), 0);
        assert_eq!(seq.next(ADDR).await.unwrap(), 1);
        assert_eq!(seq.next(other).await.unwrap(), 0);
        assert_eq!(seq.next(ADDR).await.unwrap(), 2);
    }
}
