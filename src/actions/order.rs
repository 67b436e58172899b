//! Order lifecycle
//!
//! ```text
//! confirmed ──cancel──────────▶ cancelled
//!     │ ──fulfil──────────────▶ completed ──add_rating──▶ completed
//!     │                             │
//!     └──initiate_return──┐         └──initiate_return──┐
//!                         ▼                             ▼
//!                  return_requested ──approve_return──▶ returned
//!                         └─────────reject_return─────▶ return_rejected
//! ```

use super::errors::RegistryResult;
use super::machine::StateMachine;
use super::transforms::{append_to, record_under};

pub const RESOURCE_TYPE: &str = "order";

/// Current order payload schema.
pub const SCHEMA_VERSION: u32 = 1;

pub fn state_machine() -> RegistryResult<StateMachine> {
    StateMachine::builder(RESOURCE_TYPE, SCHEMA_VERSION)
        .initial("confirmed")
        .action("confirmed", "cancel", "cancelled", record_under("cancellation"))
        .action("confirmed", "fulfil", "completed", record_under("fulfilment"))
        .action("confirmed", "initiate_return", "return_requested", record_under("return_request"))
        .action("completed", "add_rating", "completed", append_to("ratings"))
        .action("completed", "initiate_return", "return_requested", record_under("return_request"))
        .action("return_requested", "approve_return", "returned", record_under("return_decision"))
        .action("return_requested", "reject_return", "return_rejected", record_under("return_decision"))
        .terminal("cancelled")
        .terminal("returned")
        .terminal("return_rejected")
        .build()
}
