//! Blockchain transaction relay core.
//!
//! Signs and submits contract calls on behalf of callers: keys live sealed
//! in a vault, a pool of identities spreads load, nonces and fees are
//! managed per address, and confirmations are tracked to a final outcome.

pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod dispatch;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod resilience;
pub mod vault;

pub use config::schema::RelayConfig;
pub use dispatch::{DispatchError, Dispatcher, InvokeRequest};
pub use lifecycle::Shutdown;
