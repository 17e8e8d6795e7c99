//! Blockchain RPC client with timeout, failover and retry.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers)
//! - Query chain state (block number, pending nonce, fees, receipts)
//! - Broadcast signed transactions
//! - Handle timeouts and network errors gracefully
//! - Provide health check for blockchain connectivity

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Encodable2718;
use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::json_rpc::ErrorPayload;
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::types::{
    BlockchainConfig, BlockchainError, BlockchainResult, ChainId, ChainRpc, ExecutionFault,
    FeeData, TxReceipt,
};
use crate::config::GasConfig;
use crate::observability::metrics;
use crate::resilience::retry_with_backoff;

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Blockchain RPC client wrapper with failover support.
#[derive(Clone)]
pub struct BlockchainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    /// Configuration.
    config: BlockchainConfig,
    /// Request timeout duration.
    timeout_duration: Duration,
    /// Retries for read calls.
    retry_count: u32,
    /// Base backoff between read retries.
    retry_delay_ms: u64,
}

impl BlockchainClient {
    /// Create a new blockchain client.
    ///
    /// Fails only when the primary URL does not parse; an unreachable node is
    /// logged and tolerated.
    pub async fn new(config: BlockchainConfig, gas: &GasConfig) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let client = Self {
            providers,
            config: config.clone(),
            timeout_duration,
            retry_count: gas.retry_count,
            retry_delay_ms: gas.retry_delay_ms,
        };

        match client.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    network = %config.network,
                    chain_id = config.chain_id,
                    "Blockchain client initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Blockchain client initialized but chain verification failed"
                );
            }
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        self.read("chain_id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    /// Check if the blockchain is reachable and healthy.
    ///
    /// Returns true if we can query the block number.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.block_number().await.is_ok();
        metrics::record_rpc_health(healthy);
        healthy
    }

    /// Get the configuration.
    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    /// Run a read against each provider in turn, retrying the whole sweep
    /// with backoff when every provider fails.
    async fn read<T, F, Fut>(&self, op: &'static str, f: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        retry_with_backoff(
            self.retry_count,
            self.retry_delay_ms,
            || self.sweep(op, &f),
            |e| matches!(e, BlockchainError::Rpc(_) | BlockchainError::Timeout(_)),
        )
        .await
    }

    async fn sweep<T, F, Fut>(&self, op: &'static str, f: &F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, f(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, op, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, op, "RPC timeout, trying next provider");
                }
            }
        }
        Err(BlockchainError::Rpc(format!("All RPC providers failed: {}", op)))
    }

    fn primary(&self) -> &DynProvider {
        &self.providers[0]
    }
}

impl ChainRpc for BlockchainClient {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        self.get_chain_id().await.map(u64::from)
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        self.read("block_number", |p| async move { p.get_block_number().await })
            .await
    }

    async fn pending_transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        self.read("pending_transaction_count", move |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn fee_data(&self) -> BlockchainResult<FeeData> {
        let latest = self
            .read("latest_block", |p| async move {
                p.get_block_by_number(BlockNumberOrTag::Latest).await
            })
            .await?;

        let supports_fee_market = latest
            .as_ref()
            .and_then(|block| block.header.base_fee_per_gas)
            .is_some();
        if !supports_fee_market {
            return Ok(FeeData::default());
        }

        let estimate = self
            .read("fee_estimate", |p| async move { p.estimate_eip1559_fees().await })
            .await?;

        Ok(FeeData {
            max_fee_per_gas: Some(estimate.max_fee_per_gas),
            max_priority_fee_per_gas: Some(estimate.max_priority_fee_per_gas),
        })
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> BlockchainResult<u64> {
        let fut = self.primary().estimate_gas(tx);
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(gas)) => Ok(gas),
            Ok(Err(e)) => Err(classify_call_error(e)),
            Err(_) => Err(BlockchainError::Timeout(self.config.rpc_timeout_secs)),
        }
    }

    async fn send_transaction(&self, envelope: TxEnvelope) -> BlockchainResult<TxHash> {
        let raw = envelope.encoded_2718();
        let fut = self.primary().send_raw_transaction(&raw);
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(e)) => match e.as_error_resp() {
                Some(payload) => Err(BlockchainError::Rejected(payload.message.to_string())),
                None => Err(BlockchainError::Rpc(e.to_string())),
            },
            Err(_) => Err(BlockchainError::Timeout(self.config.rpc_timeout_secs)),
        }
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        let receipt = self
            .read("transaction_receipt", move |p| async move {
                p.get_transaction_receipt(tx_hash).await
            })
            .await?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash: r.transaction_hash,
            block_number: r.block_number.unwrap_or_default(),
            gas_used: r.gas_used,
            success: r.status(),
            from: r.from,
            to: r.to,
        }))
    }

    async fn transaction_exists(&self, tx_hash: TxHash) -> BlockchainResult<bool> {
        self.read("transaction_by_hash", move |p| async move {
            p.get_transaction_by_hash(tx_hash).await
        })
        .await
        .map(|tx| tx.is_some())
    }

    async fn call_at(&self, tx: TransactionRequest, block: u64) -> BlockchainResult<Bytes> {
        let fut = self.primary().call(tx).block(BlockId::number(block));
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(classify_call_error(e)),
            Err(_) => Err(BlockchainError::Timeout(self.config.rpc_timeout_secs)),
        }
    }
}

/// Map a node error from a call into a structured execution fault when the
/// node answered, or a plain RPC error when it did not.
fn classify_call_error(err: TransportError) -> BlockchainError {
    match err.as_error_resp() {
        Some(payload) => BlockchainError::Execution(execution_fault(payload)),
        None => BlockchainError::Rpc(err.to_string()),
    }
}

fn execution_fault(payload: &ErrorPayload) -> ExecutionFault {
    let mut fault = ExecutionFault {
        message: payload.message.to_string(),
        ..Default::default()
    };

    let Some(raw) = payload.data.as_ref() else {
        return fault;
    };

    match serde_json::from_str::<serde_json::Value>(raw.get()) {
        Ok(serde_json::Value::String(hex)) => fault.nested_data = Some(hex),
        Ok(serde_json::Value::Object(map)) => {
            fault.reason = map.get("reason").and_then(|v| v.as_str()).map(String::from);
            fault.data = map.get("data").and_then(|v| v.as_str()).map(String::from);
            fault.nested_data = map
                .get("error")
                .and_then(|e| e.get("data"))
                .and_then(|v| v.as_str())
                .map(String::from);
        }
        _ => fault.data = Some(raw.get().to_string()),
    }

    fault
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("providers", &self.providers.len())
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::value::RawValue;

    fn test_config() -> BlockchainConfig {
        BlockchainConfig {
            rpc_url: "http://127.0.0.1:1".to_string(),
            rpc_timeout_secs: 1,
            ..Default::default()
        }
    }

    fn no_retry() -> GasConfig {
        GasConfig {
            retry_count: 0,
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    fn payload(message: &str, data: Option<&str>) -> ErrorPayload {
        ErrorPayload {
            code: 3,
            message: message.to_string().into(),
            data: data.map(|d| RawValue::from_string(d.to_string()).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_client_creation() {
        // Client creation should succeed even if RPC is unreachable
        let result = BlockchainClient::new(test_config(), &no_retry()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_primary_url() {
        let mut config = test_config();
        config.rpc_url = "not a url".to_string();
        assert!(BlockchainClient::new(config, &no_retry()).await.is_err());
    }

    #[tokio::test]
    async fn test_rpc_failover() {
        let mut config = test_config();
        config.failover_urls.push("http://127.0.0.1:2".to_string());

        let client = BlockchainClient::new(config, &no_retry()).await.unwrap();
        let result = client.get_chain_id().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("All RPC providers failed"));
    }

    #[test]
    fn test_execution_fault_hex_data() {
        let fault = execution_fault(&payload("execution reverted", Some("\"0x08c379a0\"")));
        assert_eq!(fault.message, "execution reverted");
        assert_eq!(fault.nested_data.as_deref(), Some("0x08c379a0"));
        assert!(fault.reason.is_none());
    }

    #[test]
    fn test_execution_fault_object_data() {
        let fault = execution_fault(&payload(
            "VM Exception",
            Some(r#"{"reason":"NOT_OWNER","data":"0xdead"}"#),
        ));
        assert_eq!(fault.reason.as_deref(), Some("NOT_OWNER"));
        assert_eq!(fault.data.as_deref(), Some("0xdead"));
    }

    #[test]
    fn test_execution_fault_without_data() {
        let fault = execution_fault(&payload("out of gas", None));
        assert_eq!(fault.message, "out of gas");
        assert_eq!(fault, ExecutionFault { message: "out of gas".into(), ..Default::default() });
    }
}
