//! Version Domain Types
//!
//! Vocabulary of the versioning core:
//! - `VersionId` - high-entropy identity of one version
//! - `ChainId` - identity of a logical entity across its versions
//! - `Version` - immutable snapshot, linked to the version it revises
//! - `VersionDraft` - a not-yet-committed successor
//! - `RevisionDetails` - audit record of the mutation that produced a version
//!
//! A chain is not stored as an entity; it is the set of versions sharing a
//! `ChainId`, ordered by `version_number`.

mod ids;
mod record;

pub use ids::{ChainId, VersionId};
pub use record::{RevisionDetails, Version, VersionDraft, SUPERSEDED_STATUS};
