//! Notifier Race Tests
//!
//! Subscribing and superseding race freely. Whatever the interleaving,
//! every subscribe call ends one of two ways:
//! - it succeeds and the subscriber receives `replace`, `superseded`, end
//! - it fails fast with `AlreadySuperseded` naming the successor
//!
//! No subscriber may wait forever.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use revchain::actions::order;
use revchain::coordinator::{MutationCoordinator, MutationRequest};
use revchain::store::IndexedVersionStore;
use revchain::{ActionRegistry, ChainId, MutationError, Subscription, TransitionEvent, VersionId};
use serde_json::json;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn coordinator() -> Arc<MutationCoordinator> {
    let registry = ActionRegistry::new().with(order::state_machine().unwrap()).unwrap();
    Arc::new(MutationCoordinator::new(
        Arc::new(IndexedVersionStore::in_memory()),
        Arc::new(registry),
    ))
}

/// Drains a subscription and checks it saw exactly the transition to
/// `successor`.
async fn expect_transition(mut sub: Subscription, successor: VersionId) {
    let first = timeout(WAIT, sub.next()).await.expect("replace never arrived");
    match first {
        Some(TransitionEvent::Replace { version }) => assert_eq!(version.id(), successor),
        other => panic!("expected replace, got {:?}", other),
    }
    let second = timeout(WAIT, sub.next()).await.expect("superseded never arrived");
    assert_eq!(second, Some(TransitionEvent::Superseded { superseded_by: successor }));
    let end = timeout(WAIT, sub.next()).await.expect("channel never closed");
    assert_eq!(end, None);
}

// =============================================================================
// Late Subscribers
// =============================================================================

/// Subscribing to every superseded version of a long chain fails fast
/// with the immediate successor.
#[test]
fn test_late_subscribers_across_chain() {
    let c = coordinator();
    let mut ids = vec![c.create_chain("order", ChainId::new("o1"), json!({})).unwrap().id()];
    for action in ["fulfil", "add_rating", "add_rating"] {
        let last = *ids.last().unwrap();
        ids.push(
            c.apply(MutationRequest::new("order", "o1", action, json!({}), last, "t"))
                .unwrap()
                .id(),
        );
    }

    for pair in ids.windows(2) {
        assert_eq!(
            c.subscribe(pair[0]).unwrap_err(),
            MutationError::AlreadySuperseded {
                version: pair[0],
                superseded_by: pair[1],
            }
        );
    }
    assert!(c.subscribe(*ids.last().unwrap()).is_ok());
}

// =============================================================================
// Subscribe vs Commit
// =============================================================================

/// Subscribers racing a commit either get the full transition or are
/// redirected. None hang.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_racing_commit() {
    const SUBSCRIBERS: usize = 16;

    for round in 0..20 {
        let c = coordinator();
        let chain = format!("race-{}", round);
        let v1 = c
            .create_chain("order", ChainId::new(chain.clone()), json!({}))
            .unwrap()
            .id();

        let barrier = Arc::new(Barrier::new(SUBSCRIBERS + 1));
        let subscribers: Vec<_> = (0..SUBSCRIBERS)
            .map(|_| {
                let c = Arc::clone(&c);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    c.subscribe(v1)
                })
            })
            .collect();

        let writer = {
            let c = Arc::clone(&c);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                c.apply(MutationRequest::new("order", chain, "cancel", json!({}), v1, "w"))
            })
        };

        let v2 = writer.join().unwrap().unwrap();
        for handle in subscribers {
            match handle.join().unwrap() {
                Ok(sub) => expect_transition(sub, v2.id()).await,
                Err(MutationError::AlreadySuperseded { version, superseded_by }) => {
                    assert_eq!(version, v1);
                    assert_eq!(superseded_by, v2.id());
                }
                Err(e) => panic!("unexpected subscribe error: {}", e),
            }
        }
        assert_eq!(c.notifier().subscriber_count(v1), 0);
    }
}

/// Subscribers of different versions on the same chain each hear only
/// about their own successor.
#[tokio::test]
async fn test_each_subscriber_hears_its_own_successor() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let sub1 = c.subscribe(v1.id()).unwrap();

    let v2 = c
        .apply(MutationRequest::new("order", "o1", "fulfil", json!({}), v1.id(), "ops"))
        .unwrap();
    let sub2 = c.subscribe(v2.id()).unwrap();

    let v3 = c
        .apply(MutationRequest::new("order", "o1", "add_rating", json!({"stars": 3}), v2.id(), "bob"))
        .unwrap();

    expect_transition(sub1, v2.id()).await;
    expect_transition(sub2, v3.id()).await;
}

/// A dropped subscriber does not disturb the others.
#[tokio::test]
async fn test_dropped_subscriber_ignored() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let gone = c.subscribe(v1.id()).unwrap();
    let kept = c.subscribe(v1.id()).unwrap();
    drop(gone);

    let v2 = c
        .apply(MutationRequest::new("order", "o1", "cancel", json!({}), v1.id(), "alice"))
        .unwrap();
    expect_transition(kept, v2.id()).await;
    assert_eq!(c.metrics().snapshot().notifications_delivered, 1);
}

/// A failed mutation notifies nobody.
#[tokio::test]
async fn test_rejected_mutation_sends_nothing() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let mut sub = c.subscribe(v1.id()).unwrap();

    let err = c
        .apply(MutationRequest::new("order", "o1", "approve_return", json!({}), v1.id(), "alice"))
        .unwrap_err();
    assert_eq!(err.code(), "ACTION_NOT_PERMITTED");

    assert!(sub.try_next().is_none());
    assert_eq!(c.notifier().subscriber_count(v1.id()), 1);
}
