//! Chain Invariant Tests
//!
//! Properties that must hold for every chain at all times:
//! - exactly one latest version
//! - `revises` / `superseded_by` form one contiguous, doubly-linked chain
//! - committed content never changes
//! - versions are never removed

use std::sync::Arc;

use revchain::actions::order;
use revchain::coordinator::{MutationCoordinator, MutationRequest};
use revchain::store::{verify_chain, ChainHistory, IndexedVersionStore, VersionStore};
use revchain::{ActionRegistry, ChainId, Version};
use serde_json::json;

fn coordinator() -> MutationCoordinator {
    let registry = ActionRegistry::new().with(order::state_machine().unwrap()).unwrap();
    MutationCoordinator::new(Arc::new(IndexedVersionStore::in_memory()), Arc::new(registry))
}

/// confirmed -> completed -> rated -> rated -> return_requested -> returned
fn long_chain(c: &MutationCoordinator, chain: &str) -> Vec<Version> {
    let mut versions = vec![c
        .create_chain("order", ChainId::new(chain), json!({"items": ["sku-1"]}))
        .unwrap()];
    for (action, args) in [
        ("fulfil", json!({"carrier": "ups"})),
        ("add_rating", json!({"stars": 4})),
        ("add_rating", json!({"stars": 5})),
        ("initiate_return", json!({"reason": "damaged"})),
        ("approve_return", json!({"refund": true})),
    ] {
        let latest = versions.last().unwrap().id();
        let next = c
            .apply(MutationRequest::new("order", chain, action, args, latest, "tester"))
            .unwrap();
        versions.push(next);
    }
    versions
}

fn reread(c: &MutationCoordinator, chain: &str) -> Vec<Version> {
    c.history(&ChainId::new(chain)).unwrap()
}

// =============================================================================
// Latest Pointer
// =============================================================================

/// Exactly one version per chain is latest.
#[test]
fn test_exactly_one_latest() {
    let c = coordinator();
    long_chain(&c, "o1");

    let history = reread(&c, "o1");
    assert_eq!(history.iter().filter(|v| v.is_latest()).count(), 1);
    assert!(history.last().unwrap().is_latest());
    assert_eq!(c.get_latest(&ChainId::new("o1")).unwrap(), *history.last().unwrap());
}

// =============================================================================
// Links
// =============================================================================

/// Every superseded version points at a successor that revises it and is
/// numbered one higher.
#[test]
fn test_supersession_links() {
    let c = coordinator();
    long_chain(&c, "o1");

    let history = reread(&c, "o1");
    for v in history.iter().filter(|v| !v.is_latest()) {
        let next = c.get_version(v.superseded_by().unwrap()).unwrap();
        assert_eq!(next.revises(), Some(v.id()));
        assert_eq!(next.version_number(), v.version_number() + 1);
        assert_eq!(v.status(), "superseded");
    }
    for (i, v) in history.iter().enumerate() {
        assert_eq!(v.version_number(), i as u64 + 1);
        assert_eq!(v.revision_details().is_none(), i == 0);
    }
}

/// The audit walk finds nothing wrong with chains built through the
/// coordinator.
#[test]
fn test_verify_chain_clean() {
    let c = coordinator();
    long_chain(&c, "o1");
    long_chain(&c, "o2");

    for chain in c.store().chain_ids().unwrap() {
        assert!(verify_chain(c.store().as_ref(), &chain).unwrap().is_empty());
    }
}

// =============================================================================
// Immutability
// =============================================================================

/// Payload, revision details and schema version read back identically
/// after later mutations.
#[test]
fn test_committed_content_is_immutable() {
    let c = coordinator();
    let v1 = c
        .create_chain("order", ChainId::new("o1"), json!({"items": ["a"]}))
        .unwrap();
    let v2 = c
        .apply(MutationRequest::new("order", "o1", "fulfil", json!({"carrier": "dhl"}), v1.id(), "ops"))
        .unwrap();

    let before_v1 = serde_json::to_vec(c.get_version(v1.id()).unwrap().payload()).unwrap();
    let before_v2 = c.get_version(v2.id()).unwrap();

    c.apply(MutationRequest::new("order", "o1", "add_rating", json!({"stars": 3}), v2.id(), "bob"))
        .unwrap();

    let after_v1 = serde_json::to_vec(c.get_version(v1.id()).unwrap().payload()).unwrap();
    let after_v2 = c.get_version(v2.id()).unwrap();

    assert_eq!(before_v1, after_v1);
    assert_eq!(before_v2.payload(), after_v2.payload());
    assert_eq!(before_v2.revision_details(), after_v2.revision_details());
    assert_eq!(before_v2.schema_version(), after_v2.schema_version());
    assert_eq!(before_v2.revises(), after_v2.revises());
    // Only the lifecycle fields moved.
    assert!(before_v2.is_latest());
    assert!(!after_v2.is_latest());
}

/// Revision details record who did what with which arguments.
#[test]
fn test_revision_details_recorded() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let v2 = c
        .apply(MutationRequest::new("order", "o1", "cancel", json!({"reason": "dup"}), v1.id(), "carol"))
        .unwrap();

    let details = v2.revision_details().unwrap();
    assert_eq!(details.action_id, "cancel");
    assert_eq!(details.actor, "carol");
    assert_eq!(details.arguments, json!({"reason": "dup"}));
}

// =============================================================================
// History
// =============================================================================

/// Nothing is ever deleted; history is ordered and restartable.
#[test]
fn test_history_keeps_every_version() {
    let c = coordinator();
    let built = long_chain(&c, "o1");

    let store: &dyn VersionStore = c.store().as_ref();
    let history = ChainHistory::open(store, &ChainId::new("o1")).unwrap();
    assert_eq!(history.len(), built.len() as u64);

    let ids: Vec<_> = history.iter().map(|v| v.unwrap().id()).collect();
    let again: Vec<_> = history.iter().map(|v| v.unwrap().id()).collect();
    assert_eq!(ids, built.iter().map(|v| v.id()).collect::<Vec<_>>());
    assert_eq!(ids, again);

    for v in &built {
        assert!(c.get_version(v.id()).is_ok());
    }
}

/// Separate chains never interfere.
#[test]
fn test_chains_are_independent() {
    let c = coordinator();
    let a = long_chain(&c, "a");
    let b1 = c.create_chain("order", ChainId::new("b"), json!({})).unwrap();

    assert_eq!(c.get_latest(&ChainId::new("b")).unwrap().id(), b1.id());
    assert_eq!(c.get_latest(&ChainId::new("a")).unwrap().id(), a.last().unwrap().id());
    assert_eq!(reread(&c, "b").len(), 1);
}
