//! Action Registry
//!
//! Data-driven state machines deciding which actions are legal in which
//! status, and how each action transforms the payload.
//!
//! This module provides:
//! - `StateMachine` - per-resource-type transition table
//! - `ActionRegistry` - resource type -> state machine
//! - `transforms` - reusable pure payload transforms
//! - `order` - the order lifecycle

mod errors;
mod machine;
pub mod order;
mod registry;
pub mod transforms;

pub use errors::{RegistryError, RegistryResult};
pub use machine::{StateMachine, StateMachineBuilder, Transition, TransformFn};
pub use registry::{ActionRegistry, ResolvedAction};
