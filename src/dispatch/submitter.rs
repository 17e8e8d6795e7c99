//! Transaction building, signing, and broadcast.
//!
//! # Responsibilities
//! - Build fee-market transactions with a buffered gas estimate
//! - Sign with the held identity
//! - Broadcast once, without retry
//! - Hand the broadcast hash to the confirmation watcher

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use std::sync::Arc;

use crate::blockchain::types::{BlockchainError, BlockchainResult, ChainRpc};
use crate::dispatch::gas::FeeQuote;
use crate::dispatch::watcher::ConfirmationWatcher;
use crate::vault::Identity;

/// Target, calldata and value of a contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub to: Address,
    pub input: Bytes,
    pub value: U256,
}

impl Call {
    pub fn new(to: Address, input: impl Into<Bytes>) -> Self {
        Self {
            to,
            input: input.into(),
            value: U256::ZERO,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Unsigned call request from `from`, used for estimation and replay.
    pub fn request(&self, from: Address) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(from)
            .with_to(self.to)
            .with_input(self.input.clone())
            .with_value(self.value)
    }
}

/// Gas limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasLimits {
    /// Used when estimation fails.
    pub fallback: u64,
    /// Multiplier applied to estimates, as an integer percentage.
    pub multiplier_percent: u64,
}

/// A broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub tx_hash: TxHash,
    pub wallet_id: String,
    pub from: Address,
    pub nonce: u64,
    pub gas_limit: u64,
}

/// Signs and broadcasts transactions.
#[derive(Debug)]
pub struct TxSubmitter<R> {
    rpc: Arc<R>,
    watcher: Arc<ConfirmationWatcher<R>>,
    chain_id: u64,
    limits: GasLimits,
}

impl<R: ChainRpc> TxSubmitter<R> {
    pub fn new(
        rpc: Arc<R>,
        watcher: Arc<ConfirmationWatcher<R>>,
        chain_id: u64,
        limits: GasLimits,
    ) -> Self {
        Self {
            rpc,
            watcher,
            chain_id,
            limits,
        }
    }

    /// Node gas estimate scaled by the multiplier (floor).
    pub async fn estimate_gas(&self, from: Address, call: &Call) -> BlockchainResult<u64> {
        let estimate = self.rpc.estimate_gas(call.request(from)).await?;
        let scaled = (estimate as u128 * self.limits.multiplier_percent as u128) / 100;
        Ok(scaled.min(u64::MAX as u128) as u64)
    }

    /// Gas limit for `call`, falling back to the configured limit.
    ///
    /// A call that reverts during estimation is still sent, so the revert is
    /// observed on-chain.
    async fn gas_limit(&self, from: Address, call: &Call) -> u64 {
        match self.estimate_gas(from, call).await {
            Ok(limit) => limit,
            Err(e) => {
                tracing::warn!(
                    to = %call.to,
                    fallback = self.limits.fallback,
                    error = %e,
                    "Gas estimation failed, using configured gas limit"
                );
                self.limits.fallback
            }
        }
    }

    /// Sign and broadcast `call` from `identity` at `nonce`.
    ///
    /// Returns once the node accepts the transaction; confirmation is the
    /// watcher's job.
    pub async fn submit(
        &self,
        identity: &Identity,
        call: &Call,
        nonce: u64,
        fees: FeeQuote,
    ) -> BlockchainResult<Submission> {
        let from = identity.address();
        let gas_limit = self.gas_limit(from, call).await;

        let envelope = call
            .request(from)
            .with_nonce(nonce)
            .with_chain_id(self.chain_id)
            .with_gas_limit(gas_limit)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .build(&identity.wallet())
            .await
            .map_err(|e| BlockchainError::Signing(e.to_string()))?;

        let tx_hash = self.rpc.send_transaction(envelope).await?;
        self.watcher.track(tx_hash, call.request(from));

        tracing::info!(
            tx_hash = %tx_hash,
            wallet_id = %identity.id(),
            address = %from,
            nonce,
            gas_limit,
            max_fee_per_gas = fees.max_fee_per_gas,
            "Transaction broadcast"
        );

        Ok(Submission {
            tx_hash,
            wallet_id: identity.id().to_string(),
            from,
            nonce,
            gas_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_request() {
        let to = Address::repeat_byte(0xaa);
        let from = Address::repeat_byte(0xbb);
        let call = Call::new(to, vec![1u8, 2, 3]).with_value(U256::from(7));
        let req = call.request(from);

        assert_eq!(req.from, Some(from));
        assert_eq!(req.to, Some(to.into()));
        assert_eq!(req.value, Some(U256::from(7)));
        assert_eq!(req.input.input().map(|b| b.to_vec()), Some(vec![1, 2, 3]));
    }
}
