//! Key vault subsystem.
//!
//! # Data Flow
//! ```text
//! master secret (environment)
//!     → cipher.rs (SHA-256 key derivation, AES-256-GCM seal/open)
//!     → store.rs (sealed blobs on disk, decrypted signer cache)
//!     → Identity (address + signer, borrowed by the wallet pool)
//! ```
//!
//! # Security Constraints
//! - Master secret ONLY from the environment
//! - Never log private keys or sensitive data
//! - Corrupt blobs fail loudly; no alternate key is ever substituted

pub mod cipher;
pub mod store;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use thiserror::Error;

pub use cipher::{SealedBlob, VaultCipher};
pub use store::{IdentityRecord, KeyVault};

/// Errors raised by the key vault.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Encryption key not found in environment variable: {0}")]
    MissingMasterSecret(String),

    #[error("Wallet {0} not found")]
    NotFound(String),

    #[error("Wallet id '{0}' is invalid (use letters, digits, '-' or '_')")]
    InvalidId(String),

    #[error("{0}")]
    InvalidKey(String),

    #[error("Failed to decrypt wallet: {0}")]
    Corrupt(String),

    #[error("Failed to encrypt wallet")]
    Encrypt,

    #[error("Wallet storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Wallet serialization error: {0}")]
    Format(#[from] serde_json::Error),
}

pub type VaultResult<T> = Result<T, VaultError>;

/// A decrypted signing identity.
///
/// The signer is not bound to any network endpoint, so a cached identity can
/// sign for whichever client is submitting.
#[derive(Clone)]
pub struct Identity {
    id: String,
    signer: PrivateKeySigner,
}

impl Identity {
    pub fn new(id: impl Into<String>, signer: PrivateKeySigner) -> Self {
        Self {
            id: id.into(),
            signer,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Wallet used to sign transaction envelopes.
    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
