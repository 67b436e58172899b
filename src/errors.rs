//! # Mutation Errors
//!
//! Error taxonomy surfaced by the mutation core. Every variant carries
//! enough structure for an automated caller to decide between retrying,
//! redirecting to a newer version, or aborting, without reading messages.

use serde_json::{json, Value};
use thiserror::Error;

use crate::coordinator::RuleViolation;
use crate::store::StoreError;
use crate::version::{ChainId, VersionId};

/// Result type for mutation operations
pub type MutationResult<T> = Result<T, MutationError>;

/// Errors returned by the coordinator and notifier
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    // ==================
    // Lookup
    // ==================
    /// Chain or version absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// No state machine registered for the resource type
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// The request names a different resource type than the chain's
    #[error("Chain {chain_id} is a {chain_type}, not a {requested}")]
    ResourceTypeMismatch {
        chain_id: ChainId,
        chain_type: String,
        requested: String,
    },

    // ==================
    // Concurrency
    // ==================
    /// The expected version is no longer the latest of its chain
    #[error("Stale write on chain {chain_id}: expected {expected}, latest is {actual_latest}")]
    StaleWrite {
        chain_id: ChainId,
        expected: VersionId,
        actual_latest: VersionId,
    },

    /// Subscription target was already superseded
    #[error("Version {version} was superseded by {superseded_by}")]
    AlreadySuperseded {
        version: VersionId,
        superseded_by: VersionId,
    },

    // ==================
    // Domain
    // ==================
    /// The state machine forbids the action in the current status
    #[error("Action '{action_id}' is not permitted for {resource_type} in status '{status}'")]
    ActionNotPermitted {
        resource_type: String,
        action_id: String,
        status: String,
    },

    /// Veto raised by a business rule, passed through unchanged
    #[error("Business rule '{}' rejected the mutation", .0.rule)]
    BusinessRuleViolation(RuleViolation),

    /// Chain already initialised
    #[error("Chain already exists: {0}")]
    DuplicateChain(ChainId),

    /// Idempotency token reused for a different request
    #[error("Idempotency token '{token}' was already used with a different request")]
    IdempotencyMismatch { token: String },

    // ==================
    // Storage
    // ==================
    /// Commit failed; no new version may exist
    #[error("Transaction failed after {attempts} attempt(s): {reason}")]
    Transaction { attempts: u32, reason: String },

    /// Stored data is damaged
    #[error("FATAL: Corruption: {0}")]
    Corruption(String),
}

impl MutationError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnknownResourceType(_) => "UNKNOWN_RESOURCE_TYPE",
            Self::ResourceTypeMismatch { .. } => "RESOURCE_TYPE_MISMATCH",
            Self::StaleWrite { .. } => "STALE_WRITE",
            Self::AlreadySuperseded { .. } => "ALREADY_SUPERSEDED",
            Self::ActionNotPermitted { .. } => "ACTION_NOT_PERMITTED",
            Self::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            Self::DuplicateChain(_) => "DUPLICATE_CHAIN",
            Self::IdempotencyMismatch { .. } => "IDEMPOTENCY_MISMATCH",
            Self::Transaction { .. } => "TRANSACTION_FAILED",
            Self::Corruption(_) => "CORRUPTION",
        }
    }

    /// HTTP status equivalent
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::UnknownResourceType(_) => 400,
            Self::ResourceTypeMismatch { .. } => 400,
            Self::StaleWrite { .. } => 409,
            Self::AlreadySuperseded { .. } => 410,
            Self::ActionNotPermitted { .. } => 422,
            Self::BusinessRuleViolation(_) => 422,
            Self::DuplicateChain(_) => 409,
            Self::IdempotencyMismatch { .. } => 409,
            Self::Transaction { .. } => 503,
            Self::Corruption(_) => 500,
        }
    }

    /// Whether resubmitting the identical request can succeed.
    ///
    /// A stale write is not retryable as-is: the caller must re-read the
    /// latest version and rebuild its request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transaction { .. })
    }

    /// Structured detail for response bodies.
    pub fn detail(&self) -> Value {
        match self {
            Self::StaleWrite {
                chain_id,
                expected,
                actual_latest,
            } => json!({
                "chain_id": chain_id,
                "expected_version": expected,
                "actual_latest": actual_latest,
            }),
            Self::AlreadySuperseded {
                version,
                superseded_by,
            } => json!({ "version": version, "superseded_by": superseded_by }),
            Self::ActionNotPermitted {
                resource_type,
                action_id,
                status,
            } => json!({
                "resource_type": resource_type,
                "action_id": action_id,
                "status": status,
            }),
            Self::BusinessRuleViolation(v) => json!({ "rule": v.rule, "detail": v.detail }),
            Self::Transaction { attempts, .. } => json!({ "attempts": attempts }),
            Self::DuplicateChain(chain_id) => json!({ "chain_id": chain_id }),
            Self::ResourceTypeMismatch {
                chain_id,
                chain_type,
                requested,
            } => json!({
                "chain_id": chain_id,
                "chain_type": chain_type,
                "requested": requested,
            }),
            _ => Value::Null,
        }
    }

    /// Maps a store failure seen outside a commit.
    ///
    /// `StaleWrite` has no request context here; the coordinator builds the
    /// full variant itself at the commit site.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::DuplicateChain(chain_id) => Self::DuplicateChain(chain_id),
            StoreError::Corruption(msg) => Self::Corruption(msg),
            StoreError::StaleWrite { actual_latest } => Self::Transaction {
                attempts: 1,
                reason: format!("unexpected stale write, latest is {}", actual_latest),
            },
            StoreError::ReadOnly => Self::Transaction {
                attempts: 1,
                reason: "store is read-only".into(),
            },
            StoreError::DuplicateVersion(id) => Self::Transaction {
                attempts: 1,
                reason: format!("version id {} already in use", id),
            },
            StoreError::Transient(msg) | StoreError::Fatal(msg) => Self::Transaction {
                attempts: 1,
                reason: msg,
            },
        }
    }
}

impl From<StoreError> for MutationError {
    fn from(err: StoreError) -> Self {
        Self::from_store(err)
    }
}
