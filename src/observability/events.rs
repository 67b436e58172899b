//! Observable lifecycle events
//!
//! Events are explicit and typed; each maps to one stable upper-snake name.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Chains
    /// Version 1 of a chain committed
    ChainCreated,

    // Mutations
    /// `apply` accepted a request
    MutationBegin,
    /// New version committed
    MutationCommitted,
    /// Request rejected before any state was touched
    MutationRejected,
    /// Expected version was not the latest
    StaleWriteDetected,
    /// Tokened request answered from the idempotency ledger
    IdempotentReplay,
    /// Transient commit failure, retrying
    CommitRetry,
    /// Commit retries exhausted or storage failed fatally
    TransactionFailed,

    // Notifications
    /// Subscribers of a superseded version were notified and closed
    VersionSuperseded,
    /// A subscription arrived after its version was superseded
    LateSubscriber,
    /// A committed transition could not be delivered to subscribers
    NotificationFailed,

    // Journal
    /// Journal replay begins
    JournalReplayBegin,
    /// Journal replay complete
    JournalReplayComplete,

    // Process
    /// Configuration loaded
    ConfigLoaded,
    /// HTTP server listening
    Serving,
    /// Shutdown complete
    ShutdownComplete,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ChainCreated => "CHAIN_CREATED",
            Event::MutationBegin => "MUTATION_BEGIN",
            Event::MutationCommitted => "MUTATION_COMMITTED",
            Event::MutationRejected => "MUTATION_REJECTED",
            Event::StaleWriteDetected => "STALE_WRITE_DETECTED",
            Event::IdempotentReplay => "IDEMPOTENT_REPLAY",
            Event::CommitRetry => "COMMIT_RETRY",
            Event::TransactionFailed => "TRANSACTION_FAILED",
            Event::VersionSuperseded => "VERSION_SUPERSEDED",
            Event::LateSubscriber => "LATE_SUBSCRIBER",
            Event::NotificationFailed => "NOTIFICATION_FAILED",
            Event::JournalReplayBegin => "JOURNAL_REPLAY_BEGIN",
            Event::JournalReplayComplete => "JOURNAL_REPLAY_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "REVCHAIN_SERVING",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
        }
    }

    /// Default severity the event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::MutationBegin => Severity::Trace,
            Event::MutationRejected
            | Event::StaleWriteDetected
            | Event::CommitRetry
            | Event::LateSubscriber
            | Event::NotificationFailed => Severity::Warn,
            Event::TransactionFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
