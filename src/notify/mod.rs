//! Change Notification
//!
//! Subscriptions are bound to a version id, not a chain: a caller holding a
//! version learns when that version is superseded and which version
//! replaced it.

mod event;
mod notifier;

pub use event::TransitionEvent;
pub use notifier::{ChangeNotifier, Subscription};
