//! Contract facade tests: typed wrappers and dynamic ABI invocation.

mod common;

use alloy::consensus::Transaction;
use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;

use common::{harness, test_config};
use tx_relay::contracts::client::{CallOptions, ContractClient};
use tx_relay::contracts::data_registry::{IDataRegistry, Permission};
use tx_relay::contracts::dlp::IDlp;
use tx_relay::contracts::tee_pool::ITeePool;
use tx_relay::contracts::Contracts;
use tx_relay::dispatch::{ErrorKind, RecordStatus};

const REGISTRY: &str = "0x1111111111111111111111111111111111111111";
const TEE_POOL: &str = "0x2222222222222222222222222222222222222222";
const DLP: &str = "0x3333333333333333333333333333333333333333";

fn configured() -> tx_relay::config::RelayConfig {
    let mut config = test_config();
    config.contracts.data_registry = REGISTRY.to_string();
    config.contracts.tee_pool = TEE_POOL.to_string();
    config.contracts.dlp = DLP.to_string();
    config
}

#[tokio::test]
async fn test_data_registry_call_is_encoded_and_sent() {
    let config = configured();
    let h = harness(config.clone(), None);
    let contracts = Contracts::from_config(&config.contracts, &h.dispatcher).unwrap();

    let owner = Address::repeat_byte(0x0a);
    let outcome = contracts
        .data_registry()
        .add_file_with_permissions_and_await(
            "ipfs://file".to_string(),
            owner,
            vec![Permission {
                account: Address::repeat_byte(0x0b),
                key: "sealed-key".to_string(),
            }],
        )
        .await
        .unwrap();
    assert!(outcome.is_success());

    let tx = &h.chain.sent()[0];
    assert_eq!(tx.to(), Some(REGISTRY.parse().unwrap()));
    let decoded = IDataRegistry::addFileWithPermissionsCall::abi_decode(tx.input()).unwrap();
    assert_eq!(decoded.url, "ipfs://file");
    assert_eq!(decoded.ownerAddress, owner);
    assert_eq!(decoded.permissions.len(), 1);

    let record = h.records.by_tx_hash(&outcome.tx_hash).unwrap();
    assert_eq!(record.method, "addFileWithPermissions");
    assert_eq!(record.status, RecordStatus::Success);
}

#[tokio::test]
async fn test_tee_pool_sends_fee_as_value() {
    let config = configured();
    let h = harness(config.clone(), Some(2));
    let contracts = Contracts::from_config(&config.contracts, &h.dispatcher).unwrap();

    contracts
        .tee_pool()
        .request_contribution_proof(U256::from(5u64), U256::from(10_000u64))
        .await
        .unwrap();

    let tx = &h.chain.sent()[0];
    assert_eq!(tx.value(), U256::from(10_000u64));
    let decoded = ITeePool::requestContributionProofCall::abi_decode(tx.input()).unwrap();
    assert_eq!(decoded.fileId, U256::from(5u64));
    assert_eq!(h.dispatcher.pool_stats().unwrap().in_use, 0);
}

#[tokio::test]
async fn test_missing_address_fails_construction() {
    let mut config = configured();
    config.contracts.dlp = String::new();
    let h = harness(config.clone(), None);

    let err = Contracts::from_config(&config.contracts, &h.dispatcher).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("dlp contract address not provided"));
}

#[tokio::test]
async fn test_dlp_reward_request() {
    let config = configured();
    let h = harness(config.clone(), None);
    let contracts = Contracts::from_config(&config.contracts, &h.dispatcher).unwrap();

    contracts
        .dlp()
        .request_reward(U256::from(3u64), U256::from(1u64))
        .await
        .unwrap();

    let tx = &h.chain.sent()[0];
    assert_eq!(tx.to(), Some(DLP.parse().unwrap()));
    let decoded = IDlp::requestRewardCall::abi_decode(tx.input()).unwrap();
    assert_eq!(decoded.fileId, U256::from(3u64));
    assert_eq!(decoded.proofIndex, U256::from(1u64));
}

#[tokio::test]
async fn test_malformed_address_rejected() {
    let mut config = configured();
    config.contracts.dlp = "not-an-address".to_string();
    let h = harness(config.clone(), None);

    let err = Contracts::from_config(&config.contracts, &h.dispatcher).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

const DLP_ABI: &str = r#"[
  {"type":"function","name":"requestReward","stateMutability":"nonpayable","outputs":[],
   "inputs":[{"name":"fileId","type":"uint256"},{"name":"proofIndex","type":"uint256"}]}
]"#;

#[tokio::test]
async fn test_dynamic_invoke_matches_typed_encoding() {
    let h = harness(test_config(), None);
    let client = ContractClient::new("dlp", Address::repeat_byte(0x33), h.dispatcher.clone())
        .with_abi_json(DLP_ABI)
        .unwrap();

    let args = [
        DynSolValue::Uint(U256::from(1u64), 256),
        DynSolValue::Uint(U256::from(2u64), 256),
    ];
    client
        .invoke("requestReward", &args, CallOptions::default())
        .await
        .unwrap();

    let expected = IDlp::requestRewardCall {
        fileId: U256::from(1u64),
        proofIndex: U256::from(2u64),
    }
    .abi_encode();
    assert_eq!(h.chain.sent()[0].input().to_vec(), expected);
}

#[tokio::test]
async fn test_dynamic_invoke_unknown_method() {
    let h = harness(test_config(), None);
    let client = ContractClient::new("dlp", Address::repeat_byte(0x33), h.dispatcher.clone())
        .with_abi_json(DLP_ABI)
        .unwrap();

    let err = client
        .invoke("requestReward", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
    assert!(h.chain.sent().is_empty());
}

#[tokio::test]
async fn test_reverting_contract_reports_reason() {
    let config = configured();
    let h = harness(config.clone(), None);
    h.chain
        .revert_calls_to(REGISTRY.parse().unwrap(), "FILE_ALREADY_ADDED");
    let contracts = Contracts::from_config(&config.contracts, &h.dispatcher).unwrap();

    let outcome = contracts
        .data_registry()
        .add_file_with_permissions_and_await("ipfs://dup".to_string(), Address::ZERO, vec![])
        .await
        .unwrap();
    assert_eq!(outcome.reason(), Some("FILE_ALREADY_ADDED"));
}
