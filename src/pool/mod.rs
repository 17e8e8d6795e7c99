//! Wallet pool subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch requests a pooled identity
//!     → manager.rs (lock roster, pick a free member)
//!     → round_robin.rs (rotate through members)
//!     → slot.rs (mark in use, arm the deadline timer)
//!     → WalletLease handed to the caller
//!     → lease dropped (or deadline fires) → member free again
//! ```
//!
//! # Design Decisions
//! - A member is in use exactly while it holds a lease
//! - Leases are RAII guards so every exit path releases
//! - Deadline expiry is a safety net, not the normal release path

pub mod manager;
pub mod round_robin;
pub mod slot;

pub use manager::{PoolError, PoolStats, WalletLease, WalletPool};
