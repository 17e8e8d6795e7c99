//! TEE Pool contract: contribution proof requests.
//!
//! Proof requests are paid (the TEE fee travels as call value) and are sent
//! from pool wallets so bursts of requests do not queue on one nonce.

use alloy::primitives::{TxHash, U256};
use alloy::sol;
use serde_json::json;

use crate::blockchain::types::ChainRpc;
use crate::contracts::client::{CallOptions, ContractClient};
use crate::dispatch::{DispatchError, DispatchOutcome};

sol! {
    interface ITeePool {
        /// Request a contribution proof for a registered file.
        function requestContributionProof(uint256 fileId) external payable;
    }
}

pub struct TeePool<R> {
    client: ContractClient<R>,
}

impl<R> std::fmt::Debug for TeePool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TeePool").field(&self.client).finish()
    }
}

impl<R: ChainRpc> TeePool<R> {
    pub fn new(client: ContractClient<R>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ContractClient<R> {
        &self.client
    }

    pub async fn request_contribution_proof(
        &self,
        file_id: U256,
        tee_fee: U256,
    ) -> Result<TxHash, DispatchError> {
        let (call, options) = proof_call(file_id, tee_fee);
        self.client.send_call(&call, options).await
    }

    pub async fn request_contribution_proof_and_await(
        &self,
        file_id: U256,
        tee_fee: U256,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (call, options) = proof_call(file_id, tee_fee);
        self.client.send_call_and_await(&call, options).await
    }
}

fn proof_call(file_id: U256, tee_fee: U256) -> (ITeePool::requestContributionProofCall, CallOptions) {
    tracing::info!(file_id = %file_id, tee_fee = %tee_fee, "Requesting contribution proof");
    let options = CallOptions {
        value: tee_fee,
        use_pool: true,
        params: json!({ "fileId": file_id, "teeFee": tee_fee }),
        ..Default::default()
    };
    (ITeePool::requestContributionProofCall { fileId: file_id }, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_call_is_paid_and_pooled() {
        let (call, options) = proof_call(U256::from(1), U256::from(1_000));
        assert_eq!(call.fileId, U256::from(1));
        assert_eq!(options.value, U256::from(1_000));
        assert!(options.use_pool);
    }
}
