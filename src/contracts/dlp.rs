//! DLP contract: contributor reward requests.

use alloy::primitives::{TxHash, U256};
use alloy::sol;
use serde_json::json;

use crate::blockchain::types::ChainRpc;
use crate::contracts::client::{CallOptions, ContractClient};
use crate::dispatch::{DispatchError, DispatchOutcome};

sol! {
    interface IDlp {
        /// Request the reward for a verified contribution proof.
        function requestReward(uint256 fileId, uint256 proofIndex) external;
    }
}

pub struct Dlp<R> {
    client: ContractClient<R>,
}

impl<R> std::fmt::Debug for Dlp<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Dlp").field(&self.client).finish()
    }
}

impl<R: ChainRpc> Dlp<R> {
    pub fn new(client: ContractClient<R>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ContractClient<R> {
        &self.client
    }

    pub async fn request_reward(
        &self,
        file_id: U256,
        proof_index: U256,
    ) -> Result<TxHash, DispatchError> {
        let (call, options) = reward_call(file_id, proof_index);
        self.client.send_call(&call, options).await
    }

    pub async fn request_reward_and_await(
        &self,
        file_id: U256,
        proof_index: U256,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (call, options) = reward_call(file_id, proof_index);
        self.client.send_call_and_await(&call, options).await
    }
}

fn reward_call(file_id: U256, proof_index: U256) -> (IDlp::requestRewardCall, CallOptions) {
    tracing::info!(file_id = %file_id, proof_index = %proof_index, "Requesting reward");
    let options = CallOptions {
        params: json!({ "fileId": file_id, "proofIndex": proof_index }),
        ..Default::default()
    };
    (
        IDlp::requestRewardCall {
            fileId: file_id,
            proofIndex: proof_index,
        },
        options,
    )
}
