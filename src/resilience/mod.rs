//! Resilience helpers.
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every RPC call has a deadline
//! - Only reads are retried; a broadcast is never repeated
//! - Jittered backoff prevents synchronized retries across dispatches

pub mod backoff;

pub use backoff::{calculate_backoff, retry_with_backoff};
