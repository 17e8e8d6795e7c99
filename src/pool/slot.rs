//! Pool slot abstraction.
//!
//! # Responsibilities
//! - Pair one identity with its lease bookkeeping
//! - Keep the "in use" flag and the deadline timer in a single field so they
//!   can only ever be set or cleared together

use std::time::{Duration, Instant};
use tokio::task::AbortHandle;

use crate::vault::Identity;

/// An outstanding hold on a slot.
#[derive(Debug)]
pub struct Lease {
    /// Unique per acquisition; stale timers and guards compare against it.
    pub id: u64,
    /// When the holder acquired the slot.
    pub acquired_at: Instant,
    /// Deadline timer that force-releases the slot.
    timer: AbortHandle,
}

impl Lease {
    pub fn new(id: u64, timer: AbortHandle) -> Self {
        Self {
            id,
            acquired_at: Instant::now(),
            timer,
        }
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // Disarm the deadline whenever the lease ends, however it ends.
        self.timer.abort();
    }
}

/// One allocatable identity within the wallet pool.
#[derive(Debug)]
pub struct PoolSlot {
    pub identity: Identity,
    lease: Option<Lease>,
}

impl PoolSlot {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            lease: None,
        }
    }

    pub fn id(&self) -> &str {
        self.identity.id()
    }

    pub fn is_free(&self) -> bool {
        self.lease.is_none()
    }

    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    /// Mark in use and arm the deadline in one step.
    pub fn occupy(&mut self, lease: Lease) {
        debug_assert!(self.lease.is_none(), "slot {} leased twice", self.id());
        self.lease = Some(lease);
    }

    /// Clear in-use and disarm the deadline. Returns the ended lease.
    pub fn vacate(&mut self) -> Option<Lease> {
        self.lease.take()
    }

    /// Vacate only if the current lease is `lease_id`.
    pub fn vacate_lease(&mut self, lease_id: u64) -> Option<Lease> {
        match &self.lease {
            Some(lease) if lease.id == lease_id => self.lease.take(),
            _ => None,
        }
    }
}
