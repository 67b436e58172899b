//! Mutation Coordination
//!
//! The single entry point for changing a chain. Every mutation flows
//! through `MutationCoordinator::apply`, which reads, validates,
//! transforms, commits and notifies, in that order.
//!
//! This module provides:
//! - `MutationCoordinator` / `MutationRequest`
//! - `BusinessRule` - external veto hooks
//! - `IdempotencyLedger` - replay of tokened requests
//! - `RetryPolicy` - bounded backoff for transient commit failures

#[allow(clippy::module_inception)]
mod coordinator;
mod idempotency;
mod retry;
mod rules;

pub use coordinator::{MutationCoordinator, MutationRequest};
pub use idempotency::{fingerprint, IdempotencyKey, IdempotencyLedger, LedgerEntry, MemoryIdempotencyLedger};
pub use retry::RetryPolicy;
pub use rules::{rule_fn, BusinessRule, FnRule, RuleContext, RuleViolation};
