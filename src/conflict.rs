//! Conflict detection
//!
//! Pre-lock fast path that rejects requests whose expected version is
//! already visibly stale. Passing this check proves nothing under
//! concurrency: the authoritative re-check happens inside
//! `VersionStore::commit_transition` while the chain lock is held.

use std::sync::Arc;

use crate::store::{StoreResult, VersionStore};
use crate::version::{ChainId, Version, VersionId};

/// Outcome of a fast-path check.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictCheck {
    /// Expected version is the latest as of the read. Carries the latest.
    Current(Version),
    /// Expected version is behind; carries the actual latest id.
    Conflict(VersionId),
}

/// Compares a caller's expected-version claim against the chain's latest.
#[derive(Clone)]
pub struct ConflictDetector {
    store: Arc<dyn VersionStore>,
}

impl ConflictDetector {
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self { store }
    }

    /// Reads the latest version of `chain_id` and compares it to `expected`.
    ///
    /// Any number of hops behind is reported the same way.
    pub fn check(&self, chain_id: &ChainId, expected: VersionId) -> StoreResult<ConflictCheck> {
        let latest = self.store.get_latest(chain_id)?;
        Ok(Self::compare(latest, expected))
    }

    /// Compares an already-read latest version against `expected`.
    pub fn compare(latest: Version, expected: VersionId) -> ConflictCheck {
        if latest.id() == expected {
            ConflictCheck::Current(latest)
        } else {
            ConflictCheck::Conflict(latest.id())
        }
    }
}
