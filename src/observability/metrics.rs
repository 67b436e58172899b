//! Mutation counters
//!
//! - Counters only, monotonic, reset on process start
//! - Relaxed atomics; values are exact but not a consistent cut

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    chains_created: AtomicU64,
    mutations_committed: AtomicU64,
    mutations_rejected: AtomicU64,
    stale_writes: AtomicU64,
    commit_retries: AtomicU64,
    transaction_failures: AtomicU64,
    idempotent_replays: AtomicU64,
    notifications_delivered: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_chains_created(&self) {
        self.chains_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_mutations_committed(&self) {
        self.mutations_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_mutations_rejected(&self) {
        self.mutations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stale_writes(&self) {
        self.stale_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commit_retries(&self) {
        self.commit_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transaction_failures(&self) {
        self.transaction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_idempotent_replays(&self) {
        self.idempotent_replays.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds the number of subscribers a broadcast reached.
    pub fn add_notifications(&self, delivered: u64) {
        self.notifications_delivered
            .fetch_add(delivered, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            chains_created: self.chains_created.load(Ordering::Relaxed),
            mutations_committed: self.mutations_committed.load(Ordering::Relaxed),
            mutations_rejected: self.mutations_rejected.load(Ordering::Relaxed),
            stale_writes: self.stale_writes.load(Ordering::Relaxed),
            commit_retries: self.commit_retries.load(Ordering::Relaxed),
            transaction_failures: self.transaction_failures.load(Ordering::Relaxed),
            idempotent_replays: self.idempotent_replays.load(Ordering::Relaxed),
            notifications_delivered: self.notifications_delivered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub chains_created: u64,
    pub mutations_committed: u64,
    pub mutations_rejected: u64,
    pub stale_writes: u64,
    pub commit_retries: u64,
    pub transaction_failures: u64,
    pub idempotent_replays: u64,
    pub notifications_delivered: u64,
}
