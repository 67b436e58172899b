//! # Registry Errors
//!
//! Mistakes made while declaring a state machine. These are programming
//! errors caught at startup, never request-time failures.

use thiserror::Error;

/// Result type for registry construction
pub type RegistryResult<T> = Result<T, RegistryError>;

/// State machine declaration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Resource type, status or action id is not a lower snake identifier
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Same action declared twice for one status
    #[error("Action '{action_id}' declared twice for status '{status}'")]
    DuplicateAction { status: String, action_id: String },

    /// Outgoing transition declared from a terminal status
    #[error("Status '{0}' is terminal and cannot have outgoing actions")]
    TerminalStatus(String),

    /// No initial status was declared
    #[error("State machine for '{0}' has no initial status")]
    MissingInitial(String),

    /// Initial status is terminal
    #[error("Initial status '{0}' is terminal")]
    TerminalInitial(String),

    /// Resource type registered twice
    #[error("Resource type already registered: {0}")]
    DuplicateResourceType(String),

    /// Registry lock poisoned
    #[error("Internal error: {0}")]
    Internal(String),
}
