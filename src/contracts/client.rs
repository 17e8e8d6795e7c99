//! Contract client shared by the per-contract wrappers.
//!
//! # Responsibilities
//! - Hold a contract address and, optionally, its JSON ABI
//! - Encode calls, either dynamically by method name or from typed bindings
//! - Hand encoded calls to the dispatcher

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use std::sync::Arc;

use crate::blockchain::types::ChainRpc;
use crate::dispatch::{DispatchError, DispatchOutcome, Dispatcher, InvokeRequest, PriorityTier};

/// Per-call dispatch options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub value: U256,
    pub tier: PriorityTier,
    pub use_pool: bool,
    /// Arguments as the caller shaped them, kept on the dispatch record.
    pub params: serde_json::Value,
}

/// One deployed contract reachable through the dispatcher.
pub struct ContractClient<R> {
    name: &'static str,
    address: Address,
    abi: Option<JsonAbi>,
    dispatcher: Arc<Dispatcher<R>>,
}

impl<R: ChainRpc> ContractClient<R> {
    pub fn new(name: &'static str, address: Address, dispatcher: Arc<Dispatcher<R>>) -> Self {
        tracing::info!(contract = name, address = %address, "Contract initialized");
        Self {
            name,
            address,
            abi: None,
            dispatcher,
        }
    }

    /// Attach a JSON ABI for dynamic invocation.
    pub fn with_abi(mut self, abi: JsonAbi) -> Self {
        self.abi = Some(abi);
        self
    }

    /// Attach a JSON ABI given as text.
    pub fn with_abi_json(self, json: &str) -> Result<Self, DispatchError> {
        let abi: JsonAbi = serde_json::from_str(json)
            .map_err(|e| DispatchError::Encoding(format!("invalid ABI for {}: {}", self.name, e)))?;
        Ok(self.with_abi(abi))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<R>> {
        &self.dispatcher
    }

    /// Encode `method(args)` against the attached ABI.
    ///
    /// Overloads are resolved by argument count.
    pub fn encode(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes, DispatchError> {
        let abi = self
            .abi
            .as_ref()
            .ok_or_else(|| DispatchError::Encoding(format!("no ABI loaded for {}", self.name)))?;
        let function = abi
            .function(method)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == args.len()))
            .ok_or_else(|| {
                DispatchError::Encoding(format!(
                    "{} has no method {} taking {} arguments",
                    self.name,
                    method,
                    args.len()
                ))
            })?;
        function
            .abi_encode_input(args)
            .map(Bytes::from)
            .map_err(|e| DispatchError::Encoding(format!("{}.{}: {}", self.name, method, e)))
    }

    /// Encode and dispatch by method name; returns once broadcast.
    pub async fn invoke(
        &self,
        method: &str,
        args: &[DynSolValue],
        options: CallOptions,
    ) -> Result<TxHash, DispatchError> {
        let calldata = self.encode(method, args)?;
        self.dispatcher
            .invoke(self.request(method, calldata, options))
            .await
    }

    /// Encode and dispatch by method name, then wait for the outcome.
    pub async fn invoke_and_await(
        &self,
        method: &str,
        args: &[DynSolValue],
        options: CallOptions,
    ) -> Result<DispatchOutcome, DispatchError> {
        let calldata = self.encode(method, args)?;
        self.dispatcher
            .invoke_and_await(self.request(method, calldata, options))
            .await
    }

    /// Dispatch a typed call; returns once broadcast.
    pub async fn send_call<C: SolCall>(
        &self,
        call: &C,
        options: CallOptions,
    ) -> Result<TxHash, DispatchError> {
        self.dispatcher
            .invoke(self.request(method_name::<C>(), call.abi_encode(), options))
            .await
    }

    /// Dispatch a typed call and wait for the outcome.
    pub async fn send_call_and_await<C: SolCall>(
        &self,
        call: &C,
        options: CallOptions,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.dispatcher
            .invoke_and_await(self.request(method_name::<C>(), call.abi_encode(), options))
            .await
    }

    fn request(
        &self,
        method: &str,
        calldata: impl Into<Bytes>,
        options: CallOptions,
    ) -> InvokeRequest {
        InvokeRequest::new(self.address, method, calldata)
            .value(options.value)
            .tier(options.tier)
            .use_pool(options.use_pool)
            .params(options.params)
    }
}

impl<R> std::fmt::Debug for ContractClient<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractClient")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("abi", &self.abi.is_some())
            .finish()
    }
}

/// Parse a configured contract address; empty or malformed is an error.
pub fn parse_address(name: &str, address: &str) -> Result<Address, DispatchError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::Config(format!(
            "{} contract address not provided",
            name
        )));
    }
    trimmed.parse::<Address>().map_err(|e| {
        DispatchError::Config(format!("{} contract address '{}': {}", name, trimmed, e))
    })
}

/// Method name of a typed call, e.g. `requestReward`.
pub fn method_name<C: SolCall>() -> &'static str {
    C::SIGNATURE
        .split_once('(')
        .map(|(name, _)| name)
        .unwrap_or(C::SIGNATURE)
}
