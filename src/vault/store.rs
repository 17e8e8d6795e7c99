//! File-backed key vault.
//!
//! # Responsibilities
//! - Persist sealed key material as `<id>.enc` JSON blobs
//! - Decrypt on demand and cache live signers by id
//! - Rotate keys without ever leaving an unsealed blob on disk
//!
//! # Security
//! - Plaintext keys exist only in process memory (zeroized on drop)
//! - Blobs are replaced by write-to-temp + rename, so a crash mid-write
//!   leaves the previous blob intact

use alloy::hex;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::vault::cipher::{SealedBlob, VaultCipher};
use crate::vault::{Identity, VaultError, VaultResult};

const BLOB_EXTENSION: &str = "enc";

/// On-disk form of an identity. Only the address is in clear.
#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    id: String,
    address: Address,
    #[serde(default)]
    pool_member: bool,
    #[serde(flatten)]
    sealed: SealedBlob,
}

/// Identity metadata readable without decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub id: String,
    pub address: Address,
    pub pool_member: bool,
}

/// Encrypted store of signing identities.
#[derive(Debug)]
pub struct KeyVault {
    cipher: VaultCipher,
    storage_path: PathBuf,
    cache: DashMap<String, Identity>,
}

impl KeyVault {
    /// Open the vault described by `config`, reading the master secret from
    /// the configured environment variable.
    pub fn open(config: &VaultConfig) -> VaultResult<Self> {
        let cipher = VaultCipher::from_env(&config.encryption_key_env_var)?;
        Self::with_cipher(cipher, &config.storage_path)
    }

    /// Open a vault at `storage_path` with an explicit cipher.
    pub fn with_cipher(cipher: VaultCipher, storage_path: impl AsRef<Path>) -> VaultResult<Self> {
        let storage_path = storage_path.as_ref().to_path_buf();
        if !storage_path.exists() {
            fs::create_dir_all(&storage_path)?;
            tracing::info!(path = %storage_path.display(), "Created wallet storage directory");
        }

        Ok(Self {
            cipher,
            storage_path,
            cache: DashMap::new(),
        })
    }

    /// Store a private key under `id`. Returns the derived address.
    pub fn store(&self, id: &str, key_material: &str) -> VaultResult<Address> {
        self.store_identity(id, key_material, false)
    }

    /// Store a private key under `id`, marking whether it belongs to the pool.
    pub fn store_identity(
        &self,
        id: &str,
        key_material: &str,
        pool_member: bool,
    ) -> VaultResult<Address> {
        let signer = parse_key(key_material)?;
        let address = signer.address();
        self.write_sealed(id, &signer, pool_member)?;

        // A replaced key must not keep serving from the cache.
        self.cache.remove(id);

        tracing::info!(wallet_id = %id, address = %address, pool_member, "Wallet stored securely");
        Ok(address)
    }

    /// Decrypt the identity stored under `id`, serving repeat calls from cache.
    pub fn retrieve(&self, id: &str) -> VaultResult<Identity> {
        if let Some(identity) = self.cache.get(id) {
            return Ok(identity.clone());
        }

        let stored = self.read_stored(id)?;
        let plaintext = self.cipher.open(&stored.sealed)?;
        let key = std::str::from_utf8(&plaintext)
            .map_err(|_| VaultError::Corrupt("key material is not UTF-8".to_string()))?;
        let signer = parse_key(key)?;

        if signer.address() != stored.address {
            return Err(VaultError::Corrupt(format!(
                "decrypted key does not match recorded address {}",
                stored.address
            )));
        }

        let identity = Identity::new(id, signer);
        self.cache.insert(id.to_string(), identity.clone());
        tracing::debug!(wallet_id = %id, address = %identity.address(), "Wallet retrieved");
        Ok(identity)
    }

    /// Whether a blob exists for `id`.
    pub fn exists(&self, id: &str) -> bool {
        blob_path(&self.storage_path, id)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    /// Remove the blob for `id` and purge it from the cache.
    pub fn delete(&self, id: &str) -> VaultResult<()> {
        let path = blob_path(&self.storage_path, id)?;
        if !path.exists() {
            return Err(VaultError::NotFound(id.to_string()));
        }

        self.cache.remove(id);
        fs::remove_file(&path)?;

        tracing::info!(wallet_id = %id, "Wallet deleted");
        Ok(())
    }

    /// Replace the key under `id` with freshly generated material.
    ///
    /// The new blob is sealed and written before it replaces the old one.
    /// Pool membership carries over. Returns the new address.
    pub fn rotate(&self, id: &str) -> VaultResult<Address> {
        let pool_member = match self.read_stored(id) {
            Ok(stored) => stored.pool_member,
            Err(VaultError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };

        let signer = PrivateKeySigner::random();
        self.write_sealed(id, &signer, pool_member)?;

        let identity = Identity::new(id, signer);
        let address = identity.address();
        self.cache.insert(id.to_string(), identity);

        tracing::info!(wallet_id = %id, address = %address, "Wallet key rotated");
        Ok(address)
    }

    /// List stored identities without decrypting them, ordered by id.
    pub fn list(&self) -> VaultResult<Vec<IdentityRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.storage_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            let stored: StoredIdentity = serde_json::from_slice(&fs::read(&path)?)?;
            records.push(IdentityRecord {
                id: stored.id,
                address: stored.address,
                pool_member: stored.pool_member,
            });
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Directory holding the sealed blobs.
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn read_stored(&self, id: &str) -> VaultResult<StoredIdentity> {
        let path = blob_path(&self.storage_path, id)?;
        if !path.exists() {
            return Err(VaultError::NotFound(id.to_string()));
        }
        let stored: StoredIdentity = serde_json::from_slice(&fs::read(&path)?)
            .map_err(|e| VaultError::Corrupt(format!("unreadable blob: {}", e)))?;
        Ok(stored)
    }

    fn write_sealed(
        &self,
        id: &str,
        signer: &PrivateKeySigner,
        pool_member: bool,
    ) -> VaultResult<()> {
        let path = blob_path(&self.storage_path, id)?;
        let key_hex = Zeroizing::new(hex::encode(signer.to_bytes()));
        let sealed = self.cipher.seal(key_hex.as_bytes())?;

        let stored = StoredIdentity {
            id: id.to_string(),
            address: signer.address(),
            pool_member,
            sealed,
        };
        let contents = serde_json::to_vec_pretty(&stored)?;

        let tmp = path.with_extension(format!("{}.tmp", BLOB_EXTENSION));
        fs::write(&tmp, contents)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Parse a hex private key, with or without `0x`.
fn parse_key(key_material: &str) -> VaultResult<PrivateKeySigner> {
    let key = key_material.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    key.parse()
        .map_err(|e| VaultError::InvalidKey(format!("Invalid private key format: {}", e)))
}

fn blob_path(storage: &Path, id: &str) -> VaultResult<PathBuf> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(VaultError::InvalidId(id.to_string()));
    }
    Ok(storage.join(format!("{}.{}", id, BLOB_EXTENSION)))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> VaultResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> VaultResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn vault(dir: &tempfile::TempDir) -> KeyVault {
        KeyVault::with_cipher(VaultCipher::from_secret("test-master"), dir.path()).unwrap()
    }

    #[test]
    fn test_store_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);

        let address = vault.store("w1", TEST_PRIVATE_KEY).unwrap();
        assert_eq!(address.to_string().to_lowercase(), TEST_ADDRESS);

        let identity = vault.retrieve("w1").unwrap();
        assert_eq!(identity.address(), address);
        assert_eq!(identity.id(), "w1");
    }

    #[test]
    fn test_no_plaintext_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        vault.store("w1", &format!("0x{}", TEST_PRIVATE_KEY)).unwrap();

        let contents = fs::read_to_string(dir.path().join("w1.enc")).unwrap();
        assert!(!contents.contains(TEST_PRIVATE_KEY));
        assert!(!dir.path().join("w1.enc.tmp").exists());
    }

    #[test]
    fn test_retrieve_from_fresh_vault_decrypts() {
        let dir = tempfile::tempdir().unwrap();
        vault(&dir).store("w1", TEST_PRIVATE_KEY).unwrap();

        let reopened = vault(&dir);
        let identity = reopened.retrieve("w1").unwrap();
        assert_eq!(identity.address().to_string().to_lowercase(), TEST_ADDRESS);
    }

    #[test]
    fn test_wrong_master_secret() {
        let dir = tempfile::tempdir().unwrap();
        vault(&dir).store("w1", TEST_PRIVATE_KEY).unwrap();

        let other = KeyVault::with_cipher(VaultCipher::from_secret("other"), dir.path()).unwrap();
        assert!(matches!(other.retrieve("w1"), Err(VaultError::Corrupt(_))));
    }

    #[test]
    fn test_missing_identity() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        assert!(!vault.exists("nope"));
        assert!(matches!(vault.retrieve("nope"), Err(VaultError::NotFound(_))));
        assert!(matches!(vault.delete("nope"), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn test_delete_purges_cache() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        vault.store("w1", TEST_PRIVATE_KEY).unwrap();
        vault.retrieve("w1").unwrap();

        vault.delete("w1").unwrap();
        assert!(!vault.exists("w1"));
        assert!(matches!(vault.retrieve("w1"), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn test_rotate_replaces_key_and_keeps_pool_flag() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        let old = vault.store_identity("pool-wallet-1", TEST_PRIVATE_KEY, true).unwrap();

        let new = vault.rotate("pool-wallet-1").unwrap();
        assert_ne!(old, new);
        assert_eq!(vault.retrieve("pool-wallet-1").unwrap().address(), new);

        let reopened = KeyVault::with_cipher(VaultCipher::from_secret("test-master"), dir.path())
            .unwrap();
        assert_eq!(reopened.retrieve("pool-wallet-1").unwrap().address(), new);

        let records = vault.list().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].pool_member);
        assert_eq!(records[0].address, new);
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        assert!(matches!(
            vault.store("../escape", TEST_PRIVATE_KEY),
            Err(VaultError::InvalidId(_))
        ));
        assert!(!vault.exists(""));
    }

    #[test]
    fn test_invalid_key_material() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        let err = vault.store("w1", "invalid_key").unwrap_err();
        assert!(err.to_string().contains("Invalid private key"));
        assert!(!vault.exists("w1"));
    }

    #[test]
    fn test_corrupt_blob_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        vault.store("w1", TEST_PRIVATE_KEY).unwrap();
        fs::write(dir.path().join("w1.enc"), "{ not json").unwrap();

        let fresh = KeyVault::with_cipher(VaultCipher::from_secret("test-master"), dir.path())
            .unwrap();
        assert!(matches!(fresh.retrieve("w1"), Err(VaultError::Corrupt(_))));
    }
}
