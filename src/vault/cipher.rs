//! AES-256-GCM sealing of key material under a master secret.
//!
//! The cipher key is `SHA-256(master secret)`. Every seal draws a fresh
//! 96-bit IV, so sealing the same plaintext twice yields different blobs.
//! GCM authentication means a tampered blob fails to open instead of
//! yielding partial plaintext.

use aead::Aead;
use aead::KeyInit;
use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use alloy::hex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::vault::VaultError;

const IV_LEN: usize = 12;

/// Ciphertext plus the IV it was sealed with, both hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlob {
    pub iv: String,
    pub ciphertext: String,
}

/// Symmetric cipher keyed by a secret derived from the master secret.
pub struct VaultCipher {
    key: Zeroizing<[u8; 32]>,
}

impl VaultCipher {
    /// Derive the cipher key from a master secret.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Read the master secret from the environment variable `var`.
    ///
    /// A missing or empty secret is fatal for the vault.
    pub fn from_env(var: &str) -> Result<Self, VaultError> {
        let secret = std::env::var(var)
            .ok()
            .filter(|s| !s.is_empty())
            .map(Zeroizing::new)
            .ok_or_else(|| VaultError::MissingMasterSecret(var.to_string()))?;
        Ok(Self::from_secret(&secret))
    }

    /// Seal `plaintext` under a freshly generated IV.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob, VaultError> {
        let iv: [u8; IV_LEN] = rand::random();
        let cipher = Aes256Gcm::new(&(*self.key).into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| VaultError::Encrypt)?;

        Ok(SealedBlob {
            iv: hex::encode(iv),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Open a sealed blob. Any corruption is an error; no partial output.
    pub fn open(&self, blob: &SealedBlob) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let iv = hex::decode(&blob.iv)
            .map_err(|e| VaultError::Corrupt(format!("iv is not hex: {}", e)))?;
        if iv.len() != IV_LEN {
            return Err(VaultError::Corrupt(format!(
                "iv must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }
        let ciphertext = hex::decode(&blob.ciphertext)
            .map_err(|e| VaultError::Corrupt(format!("ciphertext is not hex: {}", e)))?;

        let cipher = Aes256Gcm::new(&(*self.key).into());
        cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map(Zeroizing::new)
            .map_err(|_| VaultError::Corrupt("authentication failed".to_string()))
    }
}

impl std::fmt::Debug for VaultCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultCipher(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let cipher = VaultCipher::from_secret("master");
        let blob = cipher.seal(b"ac0974bec39a17e36ba4a6b4d238ff94").unwrap();
        let plain = cipher.open(&blob).unwrap();
        assert_eq!(plain.as_slice(), b"ac0974bec39a17e36ba4a6b4d238ff94");
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let cipher = VaultCipher::from_secret("master");
        let a = cipher.seal(b"same input").unwrap();
        let b = cipher.seal(b"same input").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let blob = VaultCipher::from_secret("one").seal(b"key").unwrap();
        let err = VaultCipher::from_secret("two").open(&blob).unwrap_err();
        assert!(matches!(err, VaultError::Corrupt(_)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = VaultCipher::from_secret("master");
        let mut blob = cipher.seal(b"key material").unwrap();
        let mut bytes = hex::decode(&blob.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        blob.ciphertext = hex::encode(bytes);
        assert!(matches!(cipher.open(&blob), Err(VaultError::Corrupt(_))));
    }

    #[test]
    fn test_bad_iv_length() {
        let cipher = VaultCipher::from_secret("master");
        let mut blob = cipher.seal(b"key").unwrap();
        blob.iv = "00".to_string();
        assert!(matches!(cipher.open(&blob), Err(VaultError::Corrupt(_))));
    }

    #[test]
    fn test_missing_env_secret() {
        let err = VaultCipher::from_env("TX_RELAY_TEST_UNSET_SECRET_VAR").unwrap_err();
        assert!(matches!(err, VaultError::MissingMasterSecret(_)));
    }
}
