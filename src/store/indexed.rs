//! IndexedVersionStore - in-memory indexes with optional journal
//!
//! Layout:
//! - one `ChainSlot` per chain, guarded by its own `RwLock`; the latest
//!   pointer is the last element of the slot (O(1) `(chain, latest)` lookup)
//! - a `VersionId -> (ChainId, version_number)` location index
//! - an optional `JournalWriter`; when present every mutation is durable
//!   before it is published
//! - a read-only mode that replays the journal and refuses writes
//!
//! Lock order is always: chain map -> chain slot -> location index ->
//! journal. The chain map lock is held only to look up or insert a slot,
//! never across a commit, so unrelated chains commit in parallel.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::journal::{journal_path, read_journal, JournalEntry, JournalWriter};
use super::VersionStore;
use crate::observability::{log_event_with_fields, Event};
use crate::version::{ChainId, Version, VersionDraft, VersionId};

/// All versions of one chain, ordered by `version_number`.
///
/// Index `n - 1` holds version `n`. An empty slot is a chain whose
/// creation has not committed; it reads as absent.
#[derive(Debug, Default)]
struct ChainSlot {
    versions: Vec<Version>,
}

impl ChainSlot {
    fn latest(&self) -> Option<&Version> {
        self.versions.last()
    }
}

/// Version store backed by in-memory indexes and an optional journal.
pub struct IndexedVersionStore {
    chains: RwLock<HashMap<ChainId, Arc<RwLock<ChainSlot>>>>,
    locations: RwLock<HashMap<VersionId, (ChainId, u64)>>,
    journal: Option<Mutex<JournalWriter>>,
    read_only: bool,
}

impl IndexedVersionStore {
    /// Creates a purely in-memory store.
    pub fn in_memory() -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
            locations: RwLock::new(HashMap::new()),
            journal: None,
            read_only: false,
        }
    }

    /// Opens a journaled store under `data_dir`, replaying existing records.
    ///
    /// Replay halts with `Corruption` on any damaged record or any record
    /// that would break the chain invariants.
    pub fn open(data_dir: &Path, fsync: bool) -> StoreResult<Self> {
        let store = Self::replay_journal(data_dir)?;
        Ok(Self {
            journal: Some(Mutex::new(JournalWriter::open(data_dir, fsync)?)),
            ..store
        })
    }

    /// Replays the journal under `data_dir` without opening it for writing.
    ///
    /// Nothing is created on disk. Writes fail with `ReadOnly`.
    pub fn open_read_only(data_dir: &Path) -> StoreResult<Self> {
        let store = Self::replay_journal(data_dir)?;
        Ok(Self {
            read_only: true,
            ..store
        })
    }

    fn replay_journal(data_dir: &Path) -> StoreResult<Self> {
        let path = journal_path(data_dir);
        let path_str = path.display().to_string();
        log_event_with_fields(Event::JournalReplayBegin, &[("path", path_str.as_str())]);

        let entries = read_journal(&path)?;
        let store = Self::in_memory();
        for entry in &entries {
            store.replay(entry)?;
        }

        let records = entries.len().to_string();
        log_event_with_fields(Event::JournalReplayComplete, &[("records", records.as_str())]);
        Ok(store)
    }

    /// Whether mutations are journaled.
    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Number of versions across all chains.
    pub fn version_count(&self) -> usize {
        self.locations.read().map(|l| l.len()).unwrap_or(0)
    }

    fn slot(&self, chain_id: &ChainId) -> StoreResult<Arc<RwLock<ChainSlot>>> {
        let chains = self.chains.read().map_err(|_| StoreError::poisoned())?;
        chains
            .get(chain_id)
            .cloned()
            .ok_or_else(|| StoreError::chain_not_found(chain_id))
    }

    fn slot_or_insert(&self, chain_id: &ChainId) -> StoreResult<Arc<RwLock<ChainSlot>>> {
        let mut chains = self.chains.write().map_err(|_| StoreError::poisoned())?;
        Ok(chains.entry(chain_id.clone()).or_default().clone())
    }

    fn locate(&self, id: VersionId) -> StoreResult<(ChainId, u64)> {
        let locations = self.locations.read().map_err(|_| StoreError::poisoned())?;
        locations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::version_not_found(id))
    }

    /// Journals `entry`, then indexes `version`.
    ///
    /// The location index stays write-locked across the append, so an id is
    /// claimed at most once and a rejected id never reaches the journal.
    fn publish(&self, entry: &JournalEntry, version: &Version) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let mut locations = self.locations.write().map_err(|_| StoreError::poisoned())?;
        if locations.contains_key(&version.id()) {
            return Err(StoreError::DuplicateVersion(version.id()));
        }
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .map_err(|_| StoreError::poisoned())?
                .append(entry)?;
        }
        locations.insert(
            version.id(),
            (version.chain_id().clone(), version.version_number()),
        );
        Ok(())
    }

    /// Indexes a replayed version. A repeated id is corruption.
    fn index_replayed(&self, version: &Version) -> StoreResult<()> {
        let mut locations = self.locations.write().map_err(|_| StoreError::poisoned())?;
        if locations.contains_key(&version.id()) {
            return Err(StoreError::Corruption(format!(
                "Version id {} appears twice",
                version.id()
            )));
        }
        locations.insert(
            version.id(),
            (version.chain_id().clone(), version.version_number()),
        );
        Ok(())
    }

    /// Applies a journal record to the in-memory indexes.
    fn replay(&self, entry: &JournalEntry) -> StoreResult<()> {
        match entry {
            JournalEntry::Initial { version } => {
                if version.version_number() != 1 || version.revises().is_some() || !version.is_latest() {
                    return Err(StoreError::Corruption(format!(
                        "Initial record for chain {} is not a first version",
                        version.chain_id()
                    )));
                }
                let slot = self.slot_or_insert(version.chain_id())?;
                let mut slot = slot.write().map_err(|_| StoreError::poisoned())?;
                if !slot.versions.is_empty() {
                    return Err(StoreError::Corruption(format!(
                        "Chain {} initialised twice",
                        version.chain_id()
                    )));
                }
                self.index_replayed(version)?;
                slot.versions.push(version.clone());
                Ok(())
            }
            JournalEntry::Transition {
                superseded,
                version,
            } => {
                let slot = self
                    .slot(version.chain_id())
                    .map_err(|_| StoreError::Corruption(format!(
                        "Transition for unknown chain {}",
                        version.chain_id()
                    )))?;
                let mut slot = slot.write().map_err(|_| StoreError::poisoned())?;
                let valid = match slot.latest() {
                    Some(latest) => {
                        latest.id() == *superseded
                            && version.revises() == Some(latest.id())
                            && version.version_number() == latest.version_number() + 1
                    }
                    None => false,
                };
                if !valid {
                    return Err(StoreError::Corruption(format!(
                        "Transition to {} does not extend the latest version of chain {}",
                        version.id(),
                        version.chain_id()
                    )));
                }
                self.index_replayed(version)?;
                if let Some(old) = slot.versions.last_mut() {
                    old.mark_superseded(version.id());
                }
                slot.versions.push(version.clone());
                Ok(())
            }
        }
    }
}

impl Default for IndexedVersionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl VersionStore for IndexedVersionStore {
    fn create_initial(
        &self,
        chain_id: ChainId,
        resource_type: &str,
        status: &str,
        payload: Value,
        schema_version: u32,
    ) -> StoreResult<Version> {
        let slot = self.slot_or_insert(&chain_id)?;
        let mut slot = slot.write().map_err(|_| StoreError::poisoned())?;
        if !slot.versions.is_empty() {
            return Err(StoreError::DuplicateChain(chain_id));
        }

        let version = Version::initial(chain_id, resource_type, status, payload, schema_version);
        self.publish(
            &JournalEntry::Initial {
                version: version.clone(),
            },
            &version,
        )?;
        slot.versions.push(version.clone());
        Ok(version)
    }

    fn get_latest(&self, chain_id: &ChainId) -> StoreResult<Version> {
        let slot = self.slot(chain_id)?;
        let slot = slot.read().map_err(|_| StoreError::poisoned())?;
        slot.latest()
            .cloned()
            .ok_or_else(|| StoreError::chain_not_found(chain_id))
    }

    fn get_version(&self, id: VersionId) -> StoreResult<Version> {
        let (chain_id, number) = self.locate(id)?;
        self.version_at(&chain_id, number)
    }

    fn version_at(&self, chain_id: &ChainId, version_number: u64) -> StoreResult<Version> {
        let slot = self.slot(chain_id)?;
        let slot = slot.read().map_err(|_| StoreError::poisoned())?;
        version_number
            .checked_sub(1)
            .and_then(|i| slot.versions.get(i as usize))
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!("version {} of chain {}", version_number, chain_id))
            })
    }

    fn commit_transition(&self, old_version_id: VersionId, draft: VersionDraft) -> StoreResult<Version> {
        let (chain_id, number) = self.locate(old_version_id)?;
        let slot = self.slot(&chain_id)?;

        // Exclusive per-chain lock: the re-check below and both writes are
        // one atomic step with respect to other committers.
        let mut slot = slot.write().map_err(|_| StoreError::poisoned())?;
        let latest = slot
            .latest()
            .ok_or_else(|| StoreError::chain_not_found(&chain_id))?;

        if latest.id() != old_version_id {
            return Err(StoreError::StaleWrite {
                actual_latest: latest.id(),
            });
        }
        debug_assert_eq!(latest.version_number(), number);

        let version = Version::successor(latest, draft);
        self.publish(
            &JournalEntry::Transition {
                superseded: old_version_id,
                version: version.clone(),
            },
            &version,
        )?;
        if let Some(old) = slot.versions.last_mut() {
            old.mark_superseded(version.id());
        }
        slot.versions.push(version.clone());
        Ok(version)
    }

    fn chain_ids(&self) -> StoreResult<Vec<ChainId>> {
        let chains = self.chains.read().map_err(|_| StoreError::poisoned())?;
        let mut ids = Vec::with_capacity(chains.len());
        for (id, slot) in chains.iter() {
            let populated = slot
                .read()
                .map(|s| !s.versions.is_empty())
                .map_err(|_| StoreError::poisoned())?;
            if populated {
                ids.push(id.clone());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
