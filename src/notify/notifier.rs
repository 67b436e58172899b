//! # Change Notifier
//!
//! Per-version subscriber sets. Registration and broadcast for one version
//! id are linearized by that version's topic mutex:
//! - a subscriber registered before the broadcast receives `Replace` then
//!   `Superseded`, then its channel closes
//! - a subscriber arriving after the version was superseded fails with
//!   `AlreadySuperseded` instead of waiting for an event that already fired
//!
//! The store is consulted inside the topic lock, so a subscriber racing the
//! window between commit and broadcast also fails fast.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;

use super::event::TransitionEvent;
use crate::errors::{MutationError, MutationResult};
use crate::observability::{log_event_with_fields, Event};
use crate::store::{StoreError, VersionStore};
use crate::version::{Version, VersionId};

type EventSender = mpsc::UnboundedSender<TransitionEvent>;
type EventReceiver = mpsc::UnboundedReceiver<TransitionEvent>;

#[derive(Debug)]
enum TopicState {
    Open(Vec<EventSender>),
    Superseded(VersionId),
}

type Topic = Arc<Mutex<TopicState>>;

fn poisoned() -> MutationError {
    MutationError::Transaction {
        attempts: 0,
        reason: "Notifier lock poisoned".into(),
    }
}

/// Delivers version-transition events to per-version subscribers
pub struct ChangeNotifier {
    store: Arc<dyn VersionStore>,
    topics: RwLock<HashMap<VersionId, Topic>>,
}

impl ChangeNotifier {
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self {
            store,
            topics: RwLock::new(HashMap::new()),
        }
    }

    fn topic(&self, version_id: VersionId) -> MutationResult<Topic> {
        if let Some(topic) = self.topics.read().map_err(|_| poisoned())?.get(&version_id) {
            return Ok(Arc::clone(topic));
        }
        let mut topics = self.topics.write().map_err(|_| poisoned())?;
        Ok(Arc::clone(topics.entry(version_id).or_insert_with(|| {
            Arc::new(Mutex::new(TopicState::Open(Vec::new())))
        })))
    }

    /// Drops the topic entry if it is still `topic`.
    fn forget(&self, version_id: VersionId, topic: &Topic) {
        if let Ok(mut topics) = self.topics.write() {
            if topics.get(&version_id).is_some_and(|t| Arc::ptr_eq(t, topic)) {
                topics.remove(&version_id);
            }
        }
    }

    fn superseded(version_id: VersionId, by: VersionId) -> MutationError {
        let version = version_id.to_string();
        let by_str = by.to_string();
        log_event_with_fields(
            Event::LateSubscriber,
            &[("version_id", version.as_str()), ("superseded_by", by_str.as_str())],
        );
        MutationError::AlreadySuperseded {
            version: version_id,
            superseded_by: by,
        }
    }

    /// Subscribes to the supersession of `version_id`.
    ///
    /// Fails with `NotFound` for an unknown version and `AlreadySuperseded`
    /// when the version is no longer the latest of its chain.
    pub fn subscribe(&self, version_id: VersionId) -> MutationResult<Subscription> {
        let topic = self.topic(version_id)?;
        let outcome = {
            let mut state = topic.lock().map_err(|_| poisoned())?;
            match &mut *state {
                TopicState::Superseded(by) => Err(Self::superseded(version_id, *by)),
                TopicState::Open(senders) => match self.store.get_version(version_id) {
                    Ok(current) if current.is_latest() => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        senders.retain(|s| !s.is_closed());
                        senders.push(tx);
                        Ok(Subscription { version_id, receiver: rx })
                    }
                    Ok(current) => {
                        let by = current.superseded_by().unwrap_or(version_id);
                        Err(Self::superseded(version_id, by))
                    }
                    Err(StoreError::NotFound(what)) => Err(MutationError::NotFound(what)),
                    Err(other) => Err(MutationError::from(other)),
                },
            }
        };

        if outcome.is_err() {
            let empty = matches!(
                topic.lock().as_deref(),
                Ok(TopicState::Open(senders)) if senders.is_empty()
            );
            if empty {
                self.forget(version_id, &topic);
            }
        }
        outcome
    }

    /// Delivers `Replace(new_version)` then `Superseded(new_version.id)` to
    /// every subscriber of `old_version_id` and closes their channels.
    ///
    /// Returns the number of subscribers reached. A second broadcast for the
    /// same version delivers nothing.
    pub fn broadcast(&self, old_version_id: VersionId, new_version: &Version) -> MutationResult<usize> {
        let topic = self.topic(old_version_id)?;
        let delivered = {
            let mut state = topic.lock().map_err(|_| poisoned())?;
            let senders = match std::mem::replace(&mut *state, TopicState::Superseded(new_version.id())) {
                TopicState::Open(senders) => senders,
                TopicState::Superseded(by) => {
                    *state = TopicState::Superseded(by);
                    Vec::new()
                }
            };

            let replace = TransitionEvent::Replace {
                version: new_version.clone(),
            };
            let superseded = TransitionEvent::Superseded {
                superseded_by: new_version.id(),
            };
            senders
                .into_iter()
                .filter(|tx| tx.send(replace.clone()).is_ok() && tx.send(superseded.clone()).is_ok())
                .count()
        };
        self.forget(old_version_id, &topic);

        let old = old_version_id.to_string();
        let new = new_version.id().to_string();
        let count = delivered.to_string();
        log_event_with_fields(
            Event::VersionSuperseded,
            &[
                ("version_id", old.as_str()),
                ("superseded_by", new.as_str()),
                ("subscribers", count.as_str()),
            ],
        );
        Ok(delivered)
    }

    /// Live subscribers of a version.
    pub fn subscriber_count(&self, version_id: VersionId) -> usize {
        let topic = match self.topics.read() {
            Ok(topics) => match topics.get(&version_id) {
                Some(topic) => Arc::clone(topic),
                None => return 0,
            },
            Err(_) => return 0,
        };
        let count = match topic.lock().as_deref() {
            Ok(TopicState::Open(senders)) => senders.iter().filter(|s| !s.is_closed()).count(),
            _ => 0,
        };
        count
    }
}

/// Receiving end of one subscription.
///
/// Yields at most two events and then `None`.
#[derive(Debug)]
pub struct Subscription {
    version_id: VersionId,
    receiver: EventReceiver,
}

impl Subscription {
    /// The version this subscription watches.
    pub fn version_id(&self) -> VersionId {
        self.version_id
    }

    /// Waits for the next event. `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<TransitionEvent> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<TransitionEvent> {
        self.receiver.try_recv().ok()
    }

    /// Converts into a stream that ends when the channel closes.
    pub fn into_stream(self) -> impl Stream<Item = TransitionEvent> + Send {
        stream::unfold(self.receiver, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }
}
