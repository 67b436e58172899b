//! Mutation Scenario Tests
//!
//! End-to-end behaviour of `MutationCoordinator::apply` over the order
//! lifecycle: the happy path, stale writes, illegal actions, live
//! notification, business-rule vetoes, idempotent replay and schema
//! evolution.

use std::sync::Arc;

use revchain::actions::{order, transforms};
use revchain::coordinator::{
    rule_fn, MemoryIdempotencyLedger, MutationCoordinator, MutationRequest, RuleViolation,
};
use revchain::store::IndexedVersionStore;
use revchain::{ActionRegistry, ChainId, MutationError, StateMachine, TransitionEvent, VersionStore};
use serde_json::json;

fn registry() -> Arc<ActionRegistry> {
    Arc::new(ActionRegistry::new().with(order::state_machine().unwrap()).unwrap())
}

fn coordinator() -> MutationCoordinator {
    MutationCoordinator::new(Arc::new(IndexedVersionStore::in_memory()), registry())
        .with_ledger(Arc::new(MemoryIdempotencyLedger::new()))
}

fn cancel(chain: &str, expected: revchain::VersionId) -> MutationRequest {
    MutationRequest::new("order", chain, "cancel", json!({"reason": "changed mind"}), expected, "alice")
}

// =============================================================================
// Order Lifecycle
// =============================================================================

/// A mutation yields version 2 and leaves version 1 superseded.
#[test]
fn test_cancel_creates_successor() {
    let c = coordinator();
    let v1 = c
        .create_chain("order", ChainId::new("o1"), json!({"items": ["a"]}))
        .unwrap();
    assert_eq!(v1.version_number(), 1);
    assert_eq!(v1.status(), "confirmed");

    let v2 = c.apply(cancel("o1", v1.id())).unwrap();
    assert_eq!(v2.version_number(), 2);
    assert_eq!(v2.status(), "cancelled");
    assert_eq!(v2.revises(), Some(v1.id()));
    assert_eq!(v2.payload()["cancellation"], json!({"reason": "changed mind"}));
    assert_eq!(v2.payload()["items"], json!(["a"]));

    let v1 = c.get_version(v1.id()).unwrap();
    assert!(!v1.is_latest());
    assert_eq!(v1.superseded_by(), Some(v2.id()));
}

/// Repeating a mutation against the old version names the real latest.
#[test]
fn test_stale_expected_version_rejected() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let v2 = c.apply(cancel("o1", v1.id())).unwrap();

    let err = c.apply(cancel("o1", v1.id())).unwrap_err();
    assert_eq!(
        err,
        MutationError::StaleWrite {
            chain_id: ChainId::new("o1"),
            expected: v1.id(),
            actual_latest: v2.id(),
        }
    );
    assert!(!err.is_retryable());
    assert_eq!(c.history(&ChainId::new("o1")).unwrap().len(), 2);
}

/// An action not offered by the current status changes nothing.
#[test]
fn test_action_not_permitted_in_terminal_status() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let v2 = c.apply(cancel("o1", v1.id())).unwrap();

    let err = c.apply(cancel("o1", v2.id())).unwrap_err();
    assert!(matches!(
        &err,
        MutationError::ActionNotPermitted { status, action_id, .. }
            if status == "cancelled" && action_id == "cancel"
    ));
    assert_eq!(err.status_code(), 422);
    assert_eq!(c.history(&ChainId::new("o1")).unwrap().len(), 2);
    assert!(c.get_latest(&ChainId::new("o1")).unwrap().is_latest());
}

/// Unknown actions and resource types are rejected before any write.
#[test]
fn test_unknown_action_and_resource_type() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();

    let err = c
        .apply(MutationRequest::new("order", "o1", "teleport", json!({}), v1.id(), "alice"))
        .unwrap_err();
    assert_eq!(err.code(), "ACTION_NOT_PERMITTED");

    let err = c
        .apply(MutationRequest::new("invoice", "o1", "cancel", json!({}), v1.id(), "alice"))
        .unwrap_err();
    assert_eq!(err, MutationError::UnknownResourceType("invoice".into()));

    let err = c.create_chain("invoice", ChainId::new("i1"), json!({})).unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_RESOURCE_TYPE");

    assert_eq!(c.history(&ChainId::new("o1")).unwrap().len(), 1);
}

/// A chain only accepts actions for the resource type it was created as.
#[test]
fn test_resource_type_is_bound_to_chain() {
    let ticket = StateMachine::builder("ticket", 1)
        .initial("confirmed")
        .action("confirmed", "cancel", "cancelled", transforms::identity())
        .terminal("cancelled")
        .build()
        .unwrap();
    let registry = ActionRegistry::new()
        .with(order::state_machine().unwrap())
        .unwrap()
        .with(ticket)
        .unwrap();
    let c = MutationCoordinator::new(Arc::new(IndexedVersionStore::in_memory()), Arc::new(registry));
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    assert_eq!(v1.resource_type(), "order");

    let err = c
        .apply(MutationRequest::new("ticket", "o1", "cancel", json!({}), v1.id(), "alice"))
        .unwrap_err();
    assert_eq!(
        err,
        MutationError::ResourceTypeMismatch {
            chain_id: ChainId::new("o1"),
            chain_type: "order".into(),
            requested: "ticket".into(),
        }
    );
    assert_eq!(err.status_code(), 400);
    assert_eq!(c.history(&ChainId::new("o1")).unwrap().len(), 1);

    let v2 = c.apply(cancel("o1", v1.id())).unwrap();
    assert_eq!(v2.resource_type(), "order");
}

/// Mutating a chain that does not exist is `NotFound`.
#[test]
fn test_missing_chain() {
    let c = coordinator();
    let err = c
        .apply(cancel("nope", revchain::VersionId::new()))
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

/// A chain id can only be created once.
#[test]
fn test_duplicate_chain() {
    let c = coordinator();
    c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    assert_eq!(
        c.create_chain("order", ChainId::new("o1"), json!({})).unwrap_err(),
        MutationError::DuplicateChain(ChainId::new("o1"))
    );
}

/// Self-transitions still create a new version.
#[test]
fn test_rating_appends_and_keeps_status() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let v2 = c
        .apply(MutationRequest::new("order", "o1", "fulfil", json!({}), v1.id(), "ops"))
        .unwrap();
    let v3 = c
        .apply(MutationRequest::new("order", "o1", "add_rating", json!({"stars": 2}), v2.id(), "bob"))
        .unwrap();
    let v4 = c
        .apply(MutationRequest::new("order", "o1", "add_rating", json!({"stars": 5}), v3.id(), "bob"))
        .unwrap();

    assert_eq!(v4.status(), "completed");
    assert_eq!(v4.version_number(), 4);
    assert_eq!(v4.payload()["ratings"], json!([{"stars": 2}, {"stars": 5}]));
    // The earlier version still shows one rating.
    assert_eq!(c.get_version(v3.id()).unwrap().payload()["ratings"], json!([{"stars": 2}]));
}

// =============================================================================
// Notification
// =============================================================================

/// A live subscriber sees replace, then superseded, then the end.
#[tokio::test]
async fn test_live_subscriber_receives_transition() {
    let c = coordinator();
    let v1 = c
        .create_chain("order", ChainId::new("o1"), json!({"items": ["a"]}))
        .unwrap();
    let mut sub = c.subscribe(v1.id()).unwrap();

    let v2 = c.apply(cancel("o1", v1.id())).unwrap();

    match sub.next().await {
        Some(TransitionEvent::Replace { version }) => {
            assert_eq!(version, v2);
            assert_eq!(version.payload(), v2.payload());
        }
        other => panic!("expected replace, got {:?}", other),
    }
    assert_eq!(
        sub.next().await,
        Some(TransitionEvent::Superseded { superseded_by: v2.id() })
    );
    assert_eq!(sub.next().await, None);
    assert_eq!(c.metrics().snapshot().notifications_delivered, 1);
}

/// Subscribing to an already superseded version fails immediately.
#[test]
fn test_late_subscriber_redirected() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let v2 = c.apply(cancel("o1", v1.id())).unwrap();

    let err = c.subscribe(v1.id()).unwrap_err();
    assert_eq!(
        err,
        MutationError::AlreadySuperseded {
            version: v1.id(),
            superseded_by: v2.id(),
        }
    );
    assert_eq!(err.status_code(), 410);
}

// =============================================================================
// Business Rules
// =============================================================================

/// A vetoing rule blocks the mutation and its detail reaches the caller.
#[test]
fn test_business_rule_veto() {
    let c = coordinator().with_rule(Arc::new(rule_fn("return_window", |ctx| {
        if ctx.action_id == "initiate_return" && ctx.current.version_number() > 2 {
            return Err(RuleViolation::new("return_window", json!({"max_version": 2})));
        }
        Ok(())
    })));

    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let v2 = c
        .apply(MutationRequest::new("order", "o1", "fulfil", json!({}), v1.id(), "ops"))
        .unwrap();
    let v3 = c
        .apply(MutationRequest::new("order", "o1", "add_rating", json!({"stars": 1}), v2.id(), "bob"))
        .unwrap();

    let err = c
        .apply(MutationRequest::new("order", "o1", "initiate_return", json!({}), v3.id(), "bob"))
        .unwrap_err();
    assert_eq!(
        err,
        MutationError::BusinessRuleViolation(RuleViolation::new("return_window", json!({"max_version": 2})))
    );
    assert_eq!(c.get_latest(&ChainId::new("o1")).unwrap().id(), v3.id());
    assert_eq!(c.metrics().snapshot().mutations_rejected, 1);
}

/// Rules see the actor and arguments of the request.
#[test]
fn test_rule_sees_request_context() {
    let c = coordinator().with_rule(Arc::new(rule_fn("staff_only_refunds", |ctx| {
        if ctx.arguments.get("refund").is_some() && ctx.actor != "staff" {
            return Err(RuleViolation::new("staff_only_refunds", json!({"actor": ctx.actor})));
        }
        Ok(())
    })));

    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    let v2 = c
        .apply(MutationRequest::new("order", "o1", "initiate_return", json!({}), v1.id(), "bob"))
        .unwrap();

    let denied = c.apply(MutationRequest::new(
        "order",
        "o1",
        "approve_return",
        json!({"refund": 10}),
        v2.id(),
        "bob",
    ));
    assert_eq!(denied.unwrap_err().code(), "BUSINESS_RULE_VIOLATION");

    let v3 = c
        .apply(MutationRequest::new("order", "o1", "approve_return", json!({"refund": 10}), v2.id(), "staff"))
        .unwrap();
    assert_eq!(v3.status(), "returned");
}

// =============================================================================
// Idempotency
// =============================================================================

/// Resubmitting a tokened request returns the first result without a new
/// version, even after the expected version has gone stale.
#[test]
fn test_idempotent_resubmission() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();

    let first = c.apply(cancel("o1", v1.id()).with_idempotency_token("tok-1")).unwrap();
    let again = c.apply(cancel("o1", v1.id()).with_idempotency_token("tok-1")).unwrap();

    assert_eq!(first.id(), again.id());
    assert_eq!(c.history(&ChainId::new("o1")).unwrap().len(), 2);
    assert_eq!(c.metrics().snapshot().idempotent_replays, 1);
}

/// Reusing a token with different content is rejected.
#[test]
fn test_idempotency_token_reuse_mismatch() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();
    c.apply(cancel("o1", v1.id()).with_idempotency_token("tok-1")).unwrap();

    let other = MutationRequest::new("order", "o1", "fulfil", json!({}), v1.id(), "alice")
        .with_idempotency_token("tok-1");
    assert_eq!(
        c.apply(other).unwrap_err(),
        MutationError::IdempotencyMismatch { token: "tok-1".into() }
    );
}

/// Tokens are scoped per chain.
#[test]
fn test_idempotency_token_scoped_to_chain() {
    let c = coordinator();
    let a1 = c.create_chain("order", ChainId::new("a"), json!({})).unwrap();
    let b1 = c.create_chain("order", ChainId::new("b"), json!({})).unwrap();

    let a2 = c.apply(cancel("a", a1.id()).with_idempotency_token("same")).unwrap();
    let b2 = c.apply(cancel("b", b1.id()).with_idempotency_token("same")).unwrap();

    assert_ne!(a2.id(), b2.id());
    assert_eq!(b2.chain_id(), &ChainId::new("b"));
}

/// A failed tokened request is not remembered.
#[test]
fn test_failed_request_not_recorded() {
    let c = coordinator();
    let v1 = c.create_chain("order", ChainId::new("o1"), json!({})).unwrap();

    let bad = MutationRequest::new("order", "o1", "approve_return", json!({}), v1.id(), "alice")
        .with_idempotency_token("tok-9");
    assert_eq!(c.apply(bad).unwrap_err().code(), "ACTION_NOT_PERMITTED");

    let good = MutationRequest::new("order", "o1", "initiate_return", json!({}), v1.id(), "alice")
        .with_idempotency_token("tok-9");
    assert_eq!(c.apply(good).unwrap().status(), "return_requested");
}

// =============================================================================
// Schema Evolution
// =============================================================================

/// Versions keep the schema version they were written with; new versions
/// carry the active one.
#[test]
fn test_schema_version_recorded_per_version() {
    let store: Arc<dyn VersionStore> = Arc::new(IndexedVersionStore::in_memory());
    let old = MutationCoordinator::new(Arc::clone(&store), registry());

    let v1 = old.create_chain("order", ChainId::new("o1"), json!({"total": 10})).unwrap();
    assert_eq!(v1.schema_version(), order::SCHEMA_VERSION);

    let order_v2 = StateMachine::builder("order", order::SCHEMA_VERSION + 1)
        .initial("confirmed")
        .action("confirmed", "cancel", "cancelled", transforms::merge_arguments())
        .terminal("cancelled")
        .build()
        .unwrap();
    let new = MutationCoordinator::new(
        Arc::clone(&store),
        Arc::new(ActionRegistry::new().with(order_v2).unwrap()),
    );

    let v2 = new
        .apply(MutationRequest::new("order", "o1", "cancel", json!({"currency": "EUR"}), v1.id(), "ops"))
        .unwrap();
    assert_eq!(v2.schema_version(), order::SCHEMA_VERSION + 1);
    assert_eq!(v2.payload(), &json!({"total": 10, "currency": "EUR"}));
    assert_eq!(
        store.get_version(v1.id()).unwrap().schema_version(),
        order::SCHEMA_VERSION
    );
}
