//! revchain - immutable resource versioning
//!
//! Every mutation creates a new, fully independent version of a resource,
//! forming an auditable chain. Writes based on stale versions are rejected,
//! and holders of a superseded version are told which version replaced it.
//!
//! Dependency order, leaves first:
//! - `version` - data model
//! - `store` - durable version storage, the only write path
//! - `conflict` - fast-path stale-write detection
//! - `actions` - per-resource-type state machines
//! - `notify` - per-version change notification
//! - `coordinator` - one atomic mutation end to end
//!
//! Around the core: `errors`, `observability`, `config`, `http`, `cli`.

pub mod actions;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod errors;
pub mod http;
pub mod notify;
pub mod observability;
pub mod store;
pub mod version;

pub use actions::{ActionRegistry, StateMachine};
pub use coordinator::{MutationCoordinator, MutationRequest};
pub use errors::{MutationError, MutationResult};
pub use notify::{ChangeNotifier, Subscription, TransitionEvent};
pub use store::{IndexedVersionStore, StoreError, VersionStore};
pub use version::{ChainId, Version, VersionId};
