//! Business-rule veto hooks
//!
//! Rules run after the state machine has accepted the action and before
//! any transform or write. A veto is surfaced to the caller unchanged.
//! Rules must not block on external services; anything slow belongs in
//! the caller, before `apply`.

use serde::Serialize;
use serde_json::Value;

use crate::version::Version;

/// A veto raised by a business rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleViolation {
    /// Name of the vetoing rule
    pub rule: String,
    /// Opaque detail supplied by the rule
    pub detail: Value,
}

impl RuleViolation {
    pub fn new(rule: impl Into<String>, detail: Value) -> Self {
        Self {
            rule: rule.into(),
            detail,
        }
    }
}

/// What a rule gets to see.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub resource_type: &'a str,
    pub current: &'a Version,
    pub action_id: &'a str,
    pub arguments: &'a Value,
    pub actor: &'a str,
}

/// External veto over a mutation.
pub trait BusinessRule: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, ctx: &RuleContext<'_>) -> Result<(), RuleViolation>;
}

/// Rule backed by a closure.
pub struct FnRule<F> {
    name: String,
    check: F,
}

impl<F> BusinessRule for FnRule<F>
where
    F: Fn(&RuleContext<'_>) -> Result<(), RuleViolation> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, ctx: &RuleContext<'_>) -> Result<(), RuleViolation> {
        (self.check)(ctx)
    }
}

/// Wraps a closure as a named rule.
pub fn rule_fn<F>(name: impl Into<String>, check: F) -> FnRule<F>
where
    F: Fn(&RuleContext<'_>) -> Result<(), RuleViolation> + Send + Sync,
{
    FnRule {
        name: name.into(),
        check,
    }
}
