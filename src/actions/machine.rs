//! Per-resource-type state machine
//!
//! `status -> { action_id -> (transform, resulting_status) }`, declared once
//! through `StateMachineBuilder` and immutable afterwards.
//!
//! Rules enforced at build time:
//! - identifiers are lower snake case
//! - no action is declared twice for the same status
//! - terminal statuses (including `superseded`) have no outgoing actions
//! - an initial status exists and is not terminal

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;

use super::errors::{RegistryError, RegistryResult};
use crate::version::SUPERSEDED_STATUS;

/// Pure payload transform: `(previous payload, arguments) -> new payload`.
pub type TransformFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();

fn is_identifier(s: &str) -> bool {
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").ok())
        .as_ref()
        .map(|re| re.is_match(s))
        .unwrap_or(false)
}

fn check_identifier(s: &str) -> RegistryResult<()> {
    if is_identifier(s) {
        Ok(())
    } else {
        Err(RegistryError::InvalidIdentifier(s.to_string()))
    }
}

/// One permitted action out of a status.
#[derive(Clone)]
pub struct Transition {
    resulting_status: String,
    transform: TransformFn,
}

impl Transition {
    pub fn resulting_status(&self) -> &str {
        &self.resulting_status
    }

    /// Runs the transform.
    pub fn apply(&self, payload: &Value, arguments: &Value) -> Value {
        (self.transform)(payload, arguments)
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("resulting_status", &self.resulting_status)
            .finish_non_exhaustive()
    }
}

/// State machine for one resource type.
#[derive(Debug, Clone)]
pub struct StateMachine {
    resource_type: String,
    schema_version: u32,
    initial_status: String,
    terminal: BTreeSet<String>,
    table: BTreeMap<String, BTreeMap<String, Transition>>,
}

impl StateMachine {
    pub fn builder(resource_type: impl Into<String>, schema_version: u32) -> StateMachineBuilder {
        StateMachineBuilder {
            resource_type: resource_type.into(),
            schema_version,
            initial_status: None,
            terminal: BTreeSet::from([SUPERSEDED_STATUS.to_string()]),
            actions: Vec::new(),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Schema version stamped on versions created now.
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Status of version 1 of a new chain.
    pub fn initial_status(&self) -> &str {
        &self.initial_status
    }

    pub fn is_terminal(&self, status: &str) -> bool {
        self.terminal.contains(status)
    }

    /// Looks up the transition for `action_id` out of `status`.
    pub fn transition(&self, status: &str, action_id: &str) -> Option<&Transition> {
        self.table.get(status)?.get(action_id)
    }

    /// Action ids permitted in `status`, sorted.
    pub fn actions_for(&self, status: &str) -> Vec<&str> {
        self.table
            .get(status)
            .map(|actions| actions.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Builder for [`StateMachine`]. Validation happens in [`build`].
///
/// [`build`]: StateMachineBuilder::build
pub struct StateMachineBuilder {
    resource_type: String,
    schema_version: u32,
    initial_status: Option<String>,
    terminal: BTreeSet<String>,
    actions: Vec<(String, String, String, TransformFn)>,
}

impl StateMachineBuilder {
    /// Sets the status new chains start in.
    pub fn initial(mut self, status: impl Into<String>) -> Self {
        self.initial_status = Some(status.into());
        self
    }

    /// Declares `action_id` out of `from`, producing `to`.
    pub fn action(
        mut self,
        from: impl Into<String>,
        action_id: impl Into<String>,
        to: impl Into<String>,
        transform: TransformFn,
    ) -> Self {
        self.actions
            .push((from.into(), action_id.into(), to.into(), transform));
        self
    }

    /// Marks a status as terminal. `superseded` is always terminal.
    pub fn terminal(mut self, status: impl Into<String>) -> Self {
        self.terminal.insert(status.into());
        self
    }

    pub fn build(self) -> RegistryResult<StateMachine> {
        check_identifier(&self.resource_type)?;

        let initial_status = self
            .initial_status
            .ok_or_else(|| RegistryError::MissingInitial(self.resource_type.clone()))?;
        check_identifier(&initial_status)?;
        if self.terminal.contains(&initial_status) {
            return Err(RegistryError::TerminalInitial(initial_status));
        }
        for status in &self.terminal {
            check_identifier(status)?;
        }

        let mut table: BTreeMap<String, BTreeMap<String, Transition>> = BTreeMap::new();
        for (from, action_id, to, transform) in self.actions {
            check_identifier(&from)?;
            check_identifier(&action_id)?;
            check_identifier(&to)?;
            if self.terminal.contains(&from) {
                return Err(RegistryError::TerminalStatus(from));
            }

            let actions = table.entry(from.clone()).or_default();
            if actions.contains_key(&action_id) {
                return Err(RegistryError::DuplicateAction {
                    status: from,
                    action_id,
                });
            }
            actions.insert(
                action_id,
                Transition {
                    resulting_status: to,
                    transform,
                },
            );
        }

        Ok(StateMachine {
            resource_type: self.resource_type,
            schema_version: self.schema_version,
            initial_status,
            terminal: self.terminal,
            table,
        })
    }
}
