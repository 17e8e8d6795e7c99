//! Data Registry contract: file registration with access permissions.

use alloy::primitives::{Address, TxHash};
use alloy::sol;
use serde_json::json;

use crate::blockchain::types::ChainRpc;
use crate::contracts::client::{CallOptions, ContractClient};
use crate::dispatch::{DispatchError, DispatchOutcome};

sol! {
    /// Grants `account` access to a file under `key`.
    #[derive(Debug, PartialEq, Eq)]
    struct Permission {
        address account;
        string key;
    }

    interface IDataRegistry {
        /// Register a file and its initial permissions.
        function addFileWithPermissions(string url, address ownerAddress, Permission[] permissions) external returns (uint256);

        event FileAdded(uint256 indexed fileId, address indexed ownerAddress, string url);
    }
}

/// Data Registry operations, sent from the default identity.
pub struct DataRegistry<R> {
    client: ContractClient<R>,
}

impl<R> std::fmt::Debug for DataRegistry<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DataRegistry").field(&self.client).finish()
    }
}

impl<R: ChainRpc> DataRegistry<R> {
    pub fn new(client: ContractClient<R>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ContractClient<R> {
        &self.client
    }

    pub async fn add_file_with_permissions(
        &self,
        url: String,
        owner: Address,
        permissions: Vec<Permission>,
    ) -> Result<TxHash, DispatchError> {
        let (call, options) = add_file_call(url, owner, permissions);
        self.client.send_call(&call, options).await
    }

    pub async fn add_file_with_permissions_and_await(
        &self,
        url: String,
        owner: Address,
        permissions: Vec<Permission>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (call, options) = add_file_call(url, owner, permissions);
        self.client.send_call_and_await(&call, options).await
    }
}

fn add_file_call(
    url: String,
    owner: Address,
    permissions: Vec<Permission>,
) -> (IDataRegistry::addFileWithPermissionsCall, CallOptions) {
    tracing::info!(
        url = %url,
        owner = %owner,
        permissions = permissions.len(),
        "Adding file to registry"
    );
    let options = CallOptions {
        params: json!({
            "url": url,
            "ownerAddress": owner,
            "permissionsCount": permissions.len(),
        }),
        ..Default::default()
    };
    let call = IDataRegistry::addFileWithPermissionsCall {
        url,
        ownerAddress: owner,
        permissions,
    };
    (call, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_add_file_call_encoding() {
        let owner = Address::repeat_byte(0x01);
        let (call, options) = add_file_call(
            "https://example.com/files/1".into(),
            owner,
            vec![Permission {
                account: Address::repeat_byte(0x02),
                key: "key-123456".into(),
            }],
        );

        let encoded = call.abi_encode();
        assert_eq!(&encoded[..4], &IDataRegistry::addFileWithPermissionsCall::SELECTOR);
        let decoded = IDataRegistry::addFileWithPermissionsCall::abi_decode(&encoded).unwrap();
        assert_eq!(decoded.ownerAddress, owner);
        assert_eq!(decoded.permissions[0].key, "key-123456");

        assert!(!options.use_pool);
        assert_eq!(options.params["permissionsCount"], 1);
    }
}
