//! Observability
//!
//! - Structured JSON logging (`Logger`)
//! - Typed lifecycle events (`Event`)
//! - Atomic counters (`MetricsRegistry`)
//!
//! Observability is read-only: a failed log write never fails a mutation.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Logs a lifecycle event at its default severity.
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Logs a lifecycle event with fields at its default severity.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
