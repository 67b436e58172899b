//! Idempotency ledger
//!
//! Maps `(chain, token)` to the version a request produced, together with a
//! SHA-256 fingerprint of the request. A repeated token with the same
//! fingerprint replays the earlier result; a repeated token with a
//! different fingerprint is rejected.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{MutationError, MutationResult};
use crate::version::{ChainId, VersionId};

/// Ledger key: tokens are scoped to one chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub chain_id: ChainId,
    pub token: String,
}

impl IdempotencyKey {
    pub fn new(chain_id: ChainId, token: impl Into<String>) -> Self {
        Self {
            chain_id,
            token: token.into(),
        }
    }
}

/// Outcome of an earlier request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub fingerprint: [u8; 32],
    pub version_id: VersionId,
}

/// Storage for idempotency outcomes.
pub trait IdempotencyLedger: Send + Sync {
    fn lookup(&self, key: &IdempotencyKey) -> MutationResult<Option<LedgerEntry>>;

    fn record(&self, key: IdempotencyKey, entry: LedgerEntry) -> MutationResult<()>;
}

/// Fingerprint of the parts of a request that must match on replay.
///
/// Arguments are hashed in their canonical serialization (object keys
/// sorted), so key order in the request body does not matter.
pub fn fingerprint(resource_type: &str, action_id: &str, arguments: &Value) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in [resource_type.as_bytes(), action_id.as_bytes()] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.update(arguments.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Unbounded in-process ledger. Entries live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryIdempotencyLedger {
    entries: RwLock<HashMap<IdempotencyKey, LedgerEntry>>,
}

impl MemoryIdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> MutationError {
    MutationError::Transaction {
        attempts: 0,
        reason: "Idempotency ledger lock poisoned".into(),
    }
}

impl IdempotencyLedger for MemoryIdempotencyLedger {
    fn lookup(&self, key: &IdempotencyKey) -> MutationResult<Option<LedgerEntry>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).copied())
    }

    fn record(&self, key: IdempotencyKey, entry: LedgerEntry) -> MutationResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.entry(key).or_insert(entry);
        Ok(())
    }
}
