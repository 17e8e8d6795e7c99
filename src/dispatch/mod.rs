//! Transaction dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! facade.rs (invoke / invoke_and_await)
//!     → nonce.rs (max of ledger and local high-water mark)
//!     → gas.rs (tiered fee quote, capped)
//!     → submitter.rs (build, sign, broadcast)
//!     → watcher.rs (confirmation depth, revert reason)
//!     → record.rs (transitions to the dispatch sink)
//! ```

pub mod facade;
pub mod gas;
pub mod nonce;
pub mod record;
pub mod submitter;
pub mod watcher;

pub use facade::{DispatchError, DispatchOutcome, Dispatcher, ErrorKind, InvokeRequest};
pub use gas::{FeePolicy, FeeQuote, GasStrategy, PriorityTier};
pub use nonce::NonceSequencer;
pub use record::{DispatchRecord, DispatchSink, MemoryRecords, RecordStatus, TracingSink};
pub use submitter::{Call, GasLimits, Submission, TxSubmitter};
pub use watcher::{
    decode_revert, decode_revert_bytes, Confirmation, ConfirmationWatcher, TxStatus, WatchPolicy,
};
