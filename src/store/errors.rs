//! # Store Errors
//!
//! Error types for version storage.

use thiserror::Error;

use crate::version::{ChainId, VersionId};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Version store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Chain or version absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Version 1 already exists for this chain
    #[error("Chain already exists: {0}")]
    DuplicateChain(ChainId),

    /// A committed version already uses this id
    #[error("Version id already in use: {0}")]
    DuplicateVersion(VersionId),

    /// The version being revised is no longer the latest
    #[error("Stale write: current latest is {actual_latest}")]
    StaleWrite { actual_latest: VersionId },

    /// The store was opened for reading only
    #[error("Store is read-only")]
    ReadOnly,

    /// Storage hiccup; nothing was published and the write may be retried
    #[error("Transient storage failure: {0}")]
    Transient(String),

    /// Storage can no longer guarantee atomicity; the store refuses writes
    #[error("FATAL: {0}")]
    Fatal(String),

    /// Journal content is damaged or violates chain invariants
    #[error("FATAL: Journal corruption: {0}")]
    Corruption(String),
}

impl StoreError {
    /// Creates a not-found error for a version id.
    pub fn version_not_found(id: VersionId) -> Self {
        Self::NotFound(format!("version {}", id))
    }

    /// Creates a not-found error for a chain id.
    pub fn chain_not_found(chain_id: &ChainId) -> Self {
        Self::NotFound(format!("chain {}", chain_id))
    }

    /// Error raised when an internal lock was poisoned by a panicking writer.
    pub(crate) fn poisoned() -> Self {
        Self::Fatal("Lock poisoned".into())
    }

    /// Whether retrying the same operation can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether the store is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Corruption(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(StoreError::Transient("disk busy".into()).is_transient());
        assert!(!StoreError::Fatal("fsync".into()).is_transient());
        assert!(!StoreError::StaleWrite { actual_latest: VersionId::new() }.is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(StoreError::Corruption("crc".into()).is_fatal());
        assert!(StoreError::poisoned().is_fatal());
        assert!(!StoreError::chain_not_found(&ChainId::new("x")).is_fatal());
    }

    #[test]
    fn test_display_names_target() {
        let err = StoreError::chain_not_found(&ChainId::new("order-9"));
        assert!(err.to_string().contains("order-9"));
    }
}
