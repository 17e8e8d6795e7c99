//! Wallet pool management.
//!
//! # Responsibilities
//! - Hand out exclusive leases on pool identities, round-robin
//! - Force-release leases held past the acquisition deadline
//! - Add and remove members at runtime
//! - Report pool statistics
//!
//! # Design Decisions
//! - All roster state sits behind one mutex; no await happens while it is held
//! - Waiters park on a `Notify` between attempts, so a release wakes them
//!   before the retry delay elapses
//! - Every acquisition gets a fresh lease id; deadline timers and guards only
//!   release the lease they were issued for

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;

use crate::config::PoolConfig;
use crate::observability::metrics;
use crate::pool::round_robin::RoundRobin;
use crate::pool::slot::{Lease, PoolSlot};
use crate::vault::Identity;

/// Errors raised by the wallet pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("No wallet available after {attempts} attempts")]
    NoWalletAvailable { attempts: u32 },

    #[error("Wallet {0} is already a pool member")]
    DuplicateMember(String),
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub in_use: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    slots: Vec<PoolSlot>,
    selector: RoundRobin,
    next_lease: u64,
}

#[derive(Debug)]
struct PoolInner {
    state: Mutex<PoolState>,
    released: Notify,
    lease_timeout: Duration,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // A panic while holding the lock cannot leave a half-written slot.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Release `id` if it is still held under `lease_id`.
    fn release_lease(&self, id: &str, lease_id: u64) -> bool {
        let ended = {
            let mut state = self.lock();
            state
                .slots
                .iter_mut()
                .find(|s| s.id() == id)
                .and_then(|s| s.vacate_lease(lease_id))
        };
        match ended {
            Some(lease) => {
                tracing::debug!(wallet = %id, held_ms = lease.held_for().as_millis() as u64, "Wallet released");
                self.released.notify_waiters();
                true
            }
            None => false,
        }
    }

    fn expire(&self, id: &str, lease_id: u64) {
        if self.release_lease(id, lease_id) {
            tracing::warn!(
                wallet = %id,
                timeout_ms = self.lease_timeout.as_millis() as u64,
                "Wallet lock expired, force-releasing"
            );
            metrics::record_forced_release();
        }
    }
}

/// Pool of signing identities with exclusive, deadline-bounded leases.
#[derive(Debug, Clone)]
pub struct WalletPool {
    inner: Arc<PoolInner>,
}

impl WalletPool {
    /// Create an empty pool whose leases expire after `lease_timeout`.
    pub fn new(lease_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState::default()),
                released: Notify::new(),
                lease_timeout,
            }),
        }
    }

    /// Create a pool from configuration and an initial roster.
    pub fn from_config(config: &PoolConfig, members: Vec<Identity>) -> Result<Self, PoolError> {
        let pool = Self::new(Duration::from_millis(config.max_acquisition_time_ms));
        for identity in members {
            pool.add_member(identity)?;
        }
        Ok(pool)
    }

    /// Acquire a free identity, retrying up to `max_attempts` times.
    ///
    /// Between attempts the caller waits for a release or `retry_delay`,
    /// whichever comes first. Must be called inside a Tokio runtime.
    pub async fn acquire(
        &self,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<WalletLease, PoolError> {
        let attempts = max_attempts.max(1);
        for attempt in 1..=attempts {
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            // Register before scanning so a release between the scan and the
            // wait is not missed.
            notified.as_mut().enable();

            if let Some(lease) = self.try_acquire() {
                tracing::debug!(wallet = %lease.id(), attempt, "Wallet acquired");
                return Ok(lease);
            }
            if attempt == attempts {
                break;
            }
            let _ = tokio::time::timeout(retry_delay, notified).await;
        }

        let stats = self.stats();
        tracing::warn!(
            attempts,
            total = stats.total,
            in_use = stats.in_use,
            "No wallet available in pool"
        );
        Err(PoolError::NoWalletAvailable { attempts })
    }

    /// Single non-blocking acquisition attempt.
    pub fn try_acquire(&self) -> Option<WalletLease> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let index = state.selector.next_free(&state.slots)?;

        state.next_lease += 1;
        let lease_id = state.next_lease;
        let identity = state.slots[index].identity.clone();

        let weak: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let timeout = self.inner.lease_timeout;
        let id = identity.id().to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&id, lease_id);
            }
        });

        state.slots[index].occupy(Lease::new(lease_id, timer.abort_handle()));
        Some(WalletLease {
            pool: self.clone(),
            identity,
            lease_id,
        })
    }

    /// Release `id` whoever holds it. Releasing a free or unknown id is a no-op.
    pub fn release(&self, id: &str) -> bool {
        let ended = {
            let mut state = self.inner.lock();
            state
                .slots
                .iter_mut()
                .find(|s| s.id() == id)
                .and_then(PoolSlot::vacate)
        };
        if ended.is_some() {
            tracing::debug!(wallet = %id, "Wallet released");
            self.inner.released.notify_waiters();
            true
        } else {
            false
        }
    }

    /// Add an identity to the roster, free.
    pub fn add_member(&self, identity: Identity) -> Result<(), PoolError> {
        let mut state = self.inner.lock();
        if state.slots.iter().any(|s| s.id() == identity.id()) {
            return Err(PoolError::DuplicateMember(identity.id().to_string()));
        }
        tracing::info!(wallet = %identity.id(), address = %identity.address(), "Wallet added to pool");
        state.slots.push(PoolSlot::new(identity));
        drop(state);
        self.inner.released.notify_waiters();
        Ok(())
    }

    /// Remove an identity from the roster, dropping any lease it holds.
    pub fn remove_member(&self, id: &str) -> bool {
        let mut state = self.inner.lock();
        let Some(index) = state.slots.iter().position(|s| s.id() == id) else {
            return false;
        };
        let slot = state.slots.remove(index);
        let len = state.slots.len();
        state.selector.on_removed(index, len);
        drop(state);

        if let Some(lease) = slot.lease() {
            tracing::warn!(wallet = %id, lease = lease.id, "Removed wallet while leased");
        } else {
            tracing::info!(wallet = %id, "Wallet removed from pool");
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().slots.iter().any(|s| s.id() == id)
    }

    pub fn is_in_use(&self, id: &str) -> bool {
        self.inner
            .lock()
            .slots
            .iter()
            .any(|s| s.id() == id && !s.is_free())
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        let total = state.slots.len();
        let in_use = state.slots.iter().filter(|s| !s.is_free()).count();
        PoolStats {
            total,
            available: total - in_use,
            in_use,
        }
    }
}

/// Exclusive hold on a pool identity.
///
/// Dropping the lease releases the identity, unless the deadline already
/// released it and someone else holds it now.
#[derive(Debug)]
pub struct WalletLease {
    pool: WalletPool,
    identity: Identity,
    lease_id: u64,
}

impl WalletLease {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Release explicitly. Equivalent to dropping the lease.
    pub fn release(self) {}
}

impl std::ops::Deref for WalletLease {
    type Target = Identity;
    fn deref(&self) -> &Self::Target {
        &self.identity
    }
}

impl Drop for WalletLease {
    fn drop(&mut self) {
        self.pool.inner.release_lease(self.identity.id(), self.lease_id);
    }
}
