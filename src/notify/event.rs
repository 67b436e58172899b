//! # Transition Events
//!
//! What a subscriber of one version receives when that version is
//! superseded: exactly one `Replace`, then exactly one `Superseded`, then
//! the channel closes.

use serde::Serialize;
use serde_json::{json, Value};

use crate::version::{Version, VersionId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionEvent {
    /// Full content of the version that replaced the subscribed one
    Replace { version: Version },

    /// Terminal event naming the superseding version
    Superseded { superseded_by: VersionId },
}

impl TransitionEvent {
    /// Event name used on streaming transports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Replace { .. } => "replace",
            Self::Superseded { .. } => "superseded",
        }
    }

    /// Event body without the type tag.
    pub fn data(&self) -> Value {
        match self {
            Self::Replace { version } => json!(version),
            Self::Superseded { superseded_by } => json!({ "superseded_by": superseded_by }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}
