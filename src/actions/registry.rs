//! # Action Registry
//!
//! Resource type -> state machine. The only place that decides whether an
//! action is legal for the current status. Business vetoes live elsewhere.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::errors::{RegistryError, RegistryResult};
use super::machine::{StateMachine, Transition};
use crate::errors::{MutationError, MutationResult};

/// An action resolved against a concrete status, ready to apply.
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    action_id: String,
    schema_version: u32,
    transition: Transition,
}

impl ResolvedAction {
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn resulting_status(&self) -> &str {
        self.transition.resulting_status()
    }

    /// Schema version active for the resource type at resolve time.
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Returns `(new payload, resulting status)`.
    pub fn apply(&self, payload: &Value, arguments: &Value) -> (Value, String) {
        (
            self.transition.apply(payload, arguments),
            self.transition.resulting_status().to_string(),
        )
    }
}

/// Registry of state machines by resource type
#[derive(Debug, Default)]
pub struct ActionRegistry {
    machines: RwLock<HashMap<String, Arc<StateMachine>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a machine. Each resource type may be registered once.
    pub fn register(&self, machine: StateMachine) -> RegistryResult<()> {
        let mut machines = self
            .machines
            .write()
            .map_err(|_| RegistryError::Internal("Lock poisoned".into()))?;
        let resource_type = machine.resource_type().to_string();
        if machines.contains_key(&resource_type) {
            return Err(RegistryError::DuplicateResourceType(resource_type));
        }
        machines.insert(resource_type, Arc::new(machine));
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(self, machine: StateMachine) -> RegistryResult<Self> {
        self.register(machine)?;
        Ok(self)
    }

    /// Returns the machine for a resource type.
    pub fn machine(&self, resource_type: &str) -> MutationResult<Arc<StateMachine>> {
        let machines = self
            .machines
            .read()
            .map_err(|_| MutationError::Transaction {
                attempts: 0,
                reason: "Lock poisoned".into(),
            })?;
        machines
            .get(resource_type)
            .cloned()
            .ok_or_else(|| MutationError::UnknownResourceType(resource_type.to_string()))
    }

    /// Resolves `action_id` out of `current_status`.
    ///
    /// Fails with `ActionNotPermitted` when the machine has no such
    /// transition, which includes every action out of a terminal status.
    pub fn resolve(
        &self,
        resource_type: &str,
        current_status: &str,
        action_id: &str,
    ) -> MutationResult<ResolvedAction> {
        let machine = self.machine(resource_type)?;
        let transition = machine
            .transition(current_status, action_id)
            .cloned()
            .ok_or_else(|| MutationError::ActionNotPermitted {
                resource_type: resource_type.to_string(),
                action_id: action_id.to_string(),
                status: current_status.to_string(),
            })?;

        Ok(ResolvedAction {
            action_id: action_id.to_string(),
            schema_version: machine.schema_version(),
            transition,
        })
    }

    /// Actions permitted for `resource_type` in `status`.
    pub fn available_actions(&self, resource_type: &str, status: &str) -> MutationResult<Vec<String>> {
        let machine = self.machine(resource_type)?;
        Ok(machine
            .actions_for(status)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Registered resource types, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .machines
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        types.sort();
        types
    }
}
