//! Version - one immutable snapshot in a chain
//!
//! - payload, revision details, schema version, resource type and `revises`
//!   never change once a version is committed
//! - only `is_latest`, `superseded_by` and `status` of an older version are
//!   updated, exactly once, when it is superseded
//!
//! All fields are private; the single mutator is the crate-private
//! `mark_superseded`, called only from `IndexedVersionStore`'s write paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChainId, VersionId};

/// Status forced onto every version that is no longer the latest.
pub const SUPERSEDED_STATUS: &str = "superseded";

/// Audit record describing how a version came to exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevisionDetails {
    /// Action that produced the version.
    pub action_id: String,
    /// Commit-time wall clock (audit only, never used for ordering).
    pub timestamp: DateTime<Utc>,
    /// Arguments the action was applied with.
    pub arguments: Value,
    /// Who requested the mutation.
    pub actor: String,
}

impl RevisionDetails {
    /// Creates details stamped with the current time.
    pub fn now(action_id: impl Into<String>, arguments: Value, actor: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            timestamp: Utc::now(),
            arguments,
            actor: actor.into(),
        }
    }
}

/// A version that has been built by the coordinator but not committed.
///
/// The id is assigned up front so that a retried commit can recognise its
/// own earlier success.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionDraft {
    pub id: VersionId,
    pub status: String,
    pub payload: Value,
    pub schema_version: u32,
    pub revision_details: RevisionDetails,
}

impl VersionDraft {
    /// Creates a draft with a freshly allocated id.
    pub fn new(
        status: impl Into<String>,
        payload: Value,
        schema_version: u32,
        revision_details: RevisionDetails,
    ) -> Self {
        Self {
            id: VersionId::new(),
            status: status.into(),
            payload,
            schema_version,
            revision_details,
        }
    }
}

/// One immutable snapshot of an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Version {
    id: VersionId,
    chain_id: ChainId,
    resource_type: String,
    version_number: u64,
    revises: Option<VersionId>,
    is_latest: bool,
    superseded_by: Option<VersionId>,
    status: String,
    payload: Value,
    schema_version: u32,
    revision_details: Option<RevisionDetails>,
}

impl Version {
    /// Builds version 1 of a chain of `resource_type`.
    pub fn initial(
        chain_id: ChainId,
        resource_type: impl Into<String>,
        status: impl Into<String>,
        payload: Value,
        schema_version: u32,
    ) -> Self {
        Self {
            id: VersionId::new(),
            chain_id,
            resource_type: resource_type.into(),
            version_number: 1,
            revises: None,
            is_latest: true,
            superseded_by: None,
            status: status.into(),
            payload,
            schema_version,
            revision_details: None,
        }
    }

    /// Builds the version that revises `previous` from a draft.
    ///
    /// The result is the new latest: `version_number` is one past the
    /// previous version and `revises` points at it.
    pub fn successor(previous: &Version, draft: VersionDraft) -> Self {
        Self {
            id: draft.id,
            chain_id: previous.chain_id.clone(),
            resource_type: previous.resource_type.clone(),
            version_number: previous.version_number + 1,
            revises: Some(previous.id),
            is_latest: true,
            superseded_by: None,
            status: draft.status,
            payload: draft.payload,
            schema_version: draft.schema_version,
            revision_details: Some(draft.revision_details),
        }
    }

    /// Flips this version from latest to superseded.
    ///
    /// Must only be called by a store while committing the transition that
    /// creates `by`.
    pub(crate) fn mark_superseded(&mut self, by: VersionId) {
        self.is_latest = false;
        self.superseded_by = Some(by);
        self.status = SUPERSEDED_STATUS.to_string();
    }

    #[inline]
    pub fn id(&self) -> VersionId {
        self.id
    }

    #[inline]
    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    /// Resource type fixed when the chain was created.
    #[inline]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    #[inline]
    pub fn version_number(&self) -> u64 {
        self.version_number
    }

    #[inline]
    pub fn revises(&self) -> Option<VersionId> {
        self.revises
    }

    #[inline]
    pub fn is_latest(&self) -> bool {
        self.is_latest
    }

    #[inline]
    pub fn superseded_by(&self) -> Option<VersionId> {
        self.superseded_by
    }

    #[inline]
    pub fn status(&self) -> &str {
        &self.status
    }

    #[inline]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    #[inline]
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    #[inline]
    pub fn revision_details(&self) -> Option<&RevisionDetails> {
        self.revision_details.as_ref()
    }
}
