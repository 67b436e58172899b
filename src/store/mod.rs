//! Version Storage
//!
//! Durable storage of version records and chain-latest pointers.
//!
//! Rules:
//! - `commit_transition` is the ONLY operation that both creates a version
//!   and mutates an older one; nothing else may flip `is_latest` or set
//!   `superseded_by`
//! - `commit_transition` re-checks, under an exclusive per-chain lock, that
//!   the version being revised is still the latest
//! - both writes of a transition become visible together or not at all
//! - versions are never deleted, and a version id is never reused
//! - reads see committed data only and never wait on other chains
//!
//! This module provides:
//! - `VersionStore` - the storage interface the core is written against
//! - `IndexedVersionStore` - in-memory indexes, optionally journaled to disk
//! - `ChainHistory` - lazy, finite, restartable view of a chain
//! - `verify_chain` - invariant audit of one chain

mod errors;
mod indexed;
pub mod journal;

pub use errors::{StoreError, StoreResult};
pub use indexed::IndexedVersionStore;

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::version::{ChainId, Version, VersionDraft, VersionId};

/// Storage interface for version chains.
///
/// Implementations must be safe to share across threads. The only write
/// paths are `create_initial` and `commit_transition`.
pub trait VersionStore: Send + Sync {
    /// Creates version 1 of `chain_id`, binding the chain to `resource_type`.
    ///
    /// Fails with `DuplicateChain` if the chain already has a version 1.
    fn create_initial(
        &self,
        chain_id: ChainId,
        resource_type: &str,
        status: &str,
        payload: Value,
        schema_version: u32,
    ) -> StoreResult<Version>;

    /// Returns the single version of the chain marked latest.
    fn get_latest(&self, chain_id: &ChainId) -> StoreResult<Version>;

    /// Returns a version by id.
    fn get_version(&self, id: VersionId) -> StoreResult<Version>;

    /// Returns version `version_number` (1-based) of a chain.
    fn version_at(&self, chain_id: &ChainId, version_number: u64) -> StoreResult<Version>;

    /// Atomically supersedes `old_version_id` with a new version built from
    /// `draft`.
    ///
    /// Fails with `StaleWrite` naming the actual latest when
    /// `old_version_id` is no longer the latest of its chain.
    fn commit_transition(&self, old_version_id: VersionId, draft: VersionDraft) -> StoreResult<Version>;

    /// Ids of every chain with at least one version, sorted.
    fn chain_ids(&self) -> StoreResult<Vec<ChainId>>;
}

impl<'s> dyn VersionStore + 's {
    /// Opens a lazy view over the full chain. See [`ChainHistory`].
    pub fn get_chain(&self, chain_id: &ChainId) -> StoreResult<ChainHistory<'_>> {
        ChainHistory::open(self, chain_id)
    }
}

/// Lazy, finite, restartable sequence of a chain's versions.
///
/// The upper bound is the chain length when the view was opened, so the
/// sequence is finite even while the chain keeps growing. Versions are
/// fetched one at a time as the iterator advances. Calling [`iter`] again
/// restarts from version 1.
///
/// [`iter`]: ChainHistory::iter
#[derive(Clone)]
pub struct ChainHistory<'a> {
    store: &'a dyn VersionStore,
    chain_id: ChainId,
    len: u64,
}

impl<'a> ChainHistory<'a> {
    /// Captures the current chain length. Fails with `NotFound` for an
    /// absent chain.
    pub fn open(store: &'a dyn VersionStore, chain_id: &ChainId) -> StoreResult<Self> {
        let latest = store.get_latest(chain_id)?;
        Ok(Self {
            store,
            chain_id: chain_id.clone(),
            len: latest.version_number(),
        })
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    /// Number of versions the view covers.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates from version 1 up to the captured length.
    pub fn iter(&self) -> ChainIter<'a> {
        ChainIter {
            store: self.store,
            chain_id: self.chain_id.clone(),
            next: 1,
            len: self.len,
        }
    }

    /// Fetches every version into a vector.
    pub fn collect_versions(&self) -> StoreResult<Vec<Version>> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &ChainHistory<'a> {
    type Item = StoreResult<Version>;
    type IntoIter = ChainIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`ChainHistory`].
pub struct ChainIter<'a> {
    store: &'a dyn VersionStore,
    chain_id: ChainId,
    next: u64,
    len: u64,
}

impl Iterator for ChainIter<'_> {
    type Item = StoreResult<Version>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.len {
            return None;
        }
        let number = self.next;
        self.next += 1;
        Some(self.store.version_at(&self.chain_id, number))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len + 1).saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

/// A broken chain invariant found by [`verify_chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Number of versions marked latest is not exactly one.
    LatestCount { chain_id: ChainId, count: usize },
    /// Version numbers are not contiguous from 1.
    NumberGap { chain_id: ChainId, expected: u64, found: u64 },
    /// `revises` does not point at the previous version.
    BrokenRevises { version: VersionId },
    /// `is_latest == false` without a matching successor, or the reverse.
    BrokenSupersededBy { version: VersionId },
    /// Version 1 carries revision details or version N > 1 lacks them.
    RevisionDetailsMismatch { version: VersionId },
    /// A version revises itself.
    SelfRevision { version: VersionId },
    /// Two versions of the chain share an id.
    DuplicateId { version: VersionId },
    /// Looking the version up by id yields a different version.
    Unreachable { version: VersionId },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestCount { chain_id, count } => {
                write!(f, "chain {} has {} latest versions", chain_id, count)
            }
            Self::NumberGap {
                chain_id,
                expected,
                found,
            } => write!(
                f,
                "chain {} expected version {} but found {}",
                chain_id, expected, found
            ),
            Self::BrokenRevises { version } => write!(f, "version {} has a broken revises link", version),
            Self::BrokenSupersededBy { version } => {
                write!(f, "version {} has a broken superseded_by link", version)
            }
            Self::RevisionDetailsMismatch { version } => {
                write!(f, "version {} has inconsistent revision details", version)
            }
            Self::SelfRevision { version } => write!(f, "version {} revises itself", version),
            Self::DuplicateId { version } => write!(f, "version id {} is used more than once", version),
            Self::Unreachable { version } => {
                write!(f, "version {} does not resolve to itself by id", version)
            }
        }
    }
}

/// Walks a chain and reports every violated invariant.
///
/// Checks exactly-one-latest, contiguous numbering, unique ids that each
/// resolve back to their own version, `revises` pointing at the previous
/// version, and `superseded_by` pointing at the next version whose
/// `revises` points back.
pub fn verify_chain(store: &dyn VersionStore, chain_id: &ChainId) -> StoreResult<Vec<InvariantViolation>> {
    let versions = ChainHistory::open(store, chain_id)?.collect_versions()?;
    let mut violations = Vec::new();

    let latest_count = versions.iter().filter(|v| v.is_latest()).count();
    if latest_count != 1 {
        violations.push(InvariantViolation::LatestCount {
            chain_id: chain_id.clone(),
            count: latest_count,
        });
    }

    let mut seen = HashSet::with_capacity(versions.len());
    for (i, version) in versions.iter().enumerate() {
        if !seen.insert(version.id()) {
            violations.push(InvariantViolation::DuplicateId { version: version.id() });
        }
        if version.revises() == Some(version.id()) {
            violations.push(InvariantViolation::SelfRevision { version: version.id() });
        }
        let resolves = match store.get_version(version.id()) {
            Ok(found) => found.chain_id() == chain_id && found.version_number() == version.version_number(),
            Err(StoreError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        if !resolves {
            violations.push(InvariantViolation::Unreachable { version: version.id() });
        }

        let expected = i as u64 + 1;
        if version.version_number() != expected {
            violations.push(InvariantViolation::NumberGap {
                chain_id: chain_id.clone(),
                expected,
                found: version.version_number(),
            });
        }

        let previous = i.checked_sub(1).map(|p| &versions[p]);
        if version.revises() != previous.map(|p| p.id()) {
            violations.push(InvariantViolation::BrokenRevises { version: version.id() });
        }

        if version.revision_details().is_some() != previous.is_some() {
            violations.push(InvariantViolation::RevisionDetailsMismatch { version: version.id() });
        }

        let next = versions.get(i + 1);
        let link_ok = match (version.is_latest(), version.superseded_by(), next) {
            (true, None, None) => true,
            (false, Some(by), Some(next)) => next.id() == by && next.revises() == Some(version.id()),
            _ => false,
        };
        if !link_ok {
            violations.push(InvariantViolation::BrokenSupersededBy { version: version.id() });
        }
    }

    Ok(violations)
}
