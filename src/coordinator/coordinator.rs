//! Mutation Coordinator
//!
//! Orchestrates one mutation:
//! 1. read the latest version
//! 2. fast-path conflict check against the caller's expected version
//! 3. confirm the chain's resource type, then resolve the action against
//!    the current status
//! 4. run business-rule vetoes
//! 5. transform the payload
//! 6. build the draft with revision details and the active schema version
//! 7. commit through `VersionStore::commit_transition`
//! 8. broadcast the transition to subscribers of the old version
//! 9. return the new version
//!
//! Steps 1-6 touch no state. A stale write at step 7 is surfaced, never
//! retried: retrying would apply the arguments to a base the caller never
//! saw. Transient storage failures at step 7 are retried with backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::Value;

use super::idempotency::{fingerprint, IdempotencyKey, IdempotencyLedger, LedgerEntry};
use super::retry::RetryPolicy;
use super::rules::{BusinessRule, RuleContext};
use crate::actions::ActionRegistry;
use crate::conflict::{ConflictCheck, ConflictDetector};
use crate::errors::{MutationError, MutationResult};
use crate::notify::{ChangeNotifier, Subscription};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::store::{ChainHistory, StoreError, VersionStore};
use crate::version::{ChainId, RevisionDetails, Version, VersionDraft, VersionId};

/// One mutation request.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub resource_type: String,
    pub chain_id: ChainId,
    pub action_id: String,
    pub arguments: Value,
    /// The version the caller believes is current
    pub expected_version: VersionId,
    pub actor: String,
    pub idempotency_token: Option<String>,
}

impl MutationRequest {
    pub fn new(
        resource_type: impl Into<String>,
        chain_id: impl Into<ChainId>,
        action_id: impl Into<String>,
        arguments: Value,
        expected_version: VersionId,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            chain_id: chain_id.into(),
            action_id: action_id.into(),
            arguments,
            expected_version,
            actor: actor.into(),
            idempotency_token: None,
        }
    }

    pub fn with_idempotency_token(mut self, token: impl Into<String>) -> Self {
        self.idempotency_token = Some(token.into());
        self
    }

    fn idempotency_key(&self) -> Option<IdempotencyKey> {
        self.idempotency_token
            .as_ref()
            .map(|token| IdempotencyKey::new(self.chain_id.clone(), token.clone()))
    }

    fn fingerprint(&self) -> [u8; 32] {
        fingerprint(&self.resource_type, &self.action_id, &self.arguments)
    }
}

/// Coordinates mutations over a version store.
pub struct MutationCoordinator {
    store: Arc<dyn VersionStore>,
    registry: Arc<ActionRegistry>,
    detector: ConflictDetector,
    notifier: Arc<ChangeNotifier>,
    rules: Vec<Arc<dyn BusinessRule>>,
    ledger: Option<Arc<dyn IdempotencyLedger>>,
    retry: RetryPolicy,
    metrics: Arc<MetricsRegistry>,
    /// Serializes requests sharing an idempotency key.
    inflight: Mutex<HashMap<IdempotencyKey, Arc<Mutex<()>>>>,
}

impl MutationCoordinator {
    pub fn new(store: Arc<dyn VersionStore>, registry: Arc<ActionRegistry>) -> Self {
        Self {
            detector: ConflictDetector::new(Arc::clone(&store)),
            notifier: Arc::new(ChangeNotifier::new(Arc::clone(&store))),
            store,
            registry,
            rules: Vec::new(),
            ledger: None,
            retry: RetryPolicy::default(),
            metrics: Arc::new(MetricsRegistry::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_rule(mut self, rule: Arc<dyn BusinessRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn IdempotencyLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn get_latest(&self, chain_id: &ChainId) -> MutationResult<Version> {
        Ok(self.store.get_latest(chain_id)?)
    }

    pub fn get_version(&self, id: VersionId) -> MutationResult<Version> {
        Ok(self.store.get_version(id)?)
    }

    /// Full ordered history of a chain.
    pub fn history(&self, chain_id: &ChainId) -> MutationResult<Vec<Version>> {
        Ok(ChainHistory::open(self.store.as_ref(), chain_id)?.collect_versions()?)
    }

    /// Subscribes to the supersession of a version.
    pub fn subscribe(&self, version_id: VersionId) -> MutationResult<Subscription> {
        self.notifier.subscribe(version_id)
    }

    /// Creates version 1 of a chain in the resource type's initial status.
    pub fn create_chain(
        &self,
        resource_type: &str,
        chain_id: ChainId,
        payload: Value,
    ) -> MutationResult<Version> {
        let machine = self.registry.machine(resource_type)?;
        let mut attempt = 1;
        loop {
            match self.store.create_initial(
                chain_id.clone(),
                resource_type,
                machine.initial_status(),
                payload.clone(),
                machine.schema_version(),
            ) {
                Ok(version) => {
                    self.metrics.increment_chains_created();
                    let id = version.id().to_string();
                    log_event_with_fields(
                        Event::ChainCreated,
                        &[
                            ("chain_id", chain_id.as_str()),
                            ("resource_type", resource_type),
                            ("version_id", id.as_str()),
                        ],
                    );
                    return Ok(version);
                }
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    self.backoff(&chain_id, attempt, &e);
                    attempt += 1;
                }
                Err(e) => return Err(self.commit_failure(&chain_id, attempt, e)),
            }
        }
    }

    /// Applies one mutation. See the module docs for the steps.
    pub fn apply(&self, request: MutationRequest) -> MutationResult<Version> {
        log_event_with_fields(
            Event::MutationBegin,
            &[
                ("action_id", request.action_id.as_str()),
                ("actor", request.actor.as_str()),
                ("chain_id", request.chain_id.as_str()),
            ],
        );

        let key = request.idempotency_key();
        let slot = match &key {
            Some(key) => Some(self.enter(key)?),
            None => None,
        };
        let held = match &slot {
            Some(slot) => Some(slot.lock().map_err(|_| MutationError::Transaction {
                attempts: 0,
                reason: "Idempotency lock poisoned".into(),
            })?),
            None => None,
        };

        let outcome = self.apply_once(&request, key.as_ref());

        drop(held);
        if let (Some(key), Some(slot)) = (&key, slot) {
            self.leave(key, slot);
        }

        match &outcome {
            Ok(_) => {}
            Err(MutationError::StaleWrite { actual_latest, .. }) => {
                self.metrics.increment_stale_writes();
                self.metrics.increment_mutations_rejected();
                let latest = actual_latest.to_string();
                let expected = request.expected_version.to_string();
                log_event_with_fields(
                    Event::StaleWriteDetected,
                    &[
                        ("actual_latest", latest.as_str()),
                        ("chain_id", request.chain_id.as_str()),
                        ("expected_version", expected.as_str()),
                    ],
                );
            }
            Err(MutationError::Transaction { .. }) | Err(MutationError::Corruption(_)) => {}
            Err(e) => {
                self.metrics.increment_mutations_rejected();
                log_event_with_fields(
                    Event::MutationRejected,
                    &[
                        ("action_id", request.action_id.as_str()),
                        ("chain_id", request.chain_id.as_str()),
                        ("code", e.code()),
                    ],
                );
            }
        }
        outcome
    }

    fn apply_once(&self, request: &MutationRequest, key: Option<&IdempotencyKey>) -> MutationResult<Version> {
        if let Some(key) = key {
            if let Some(prior) = self.replay(key, request)? {
                return Ok(prior);
            }
        }

        match self.mutate(request) {
            Ok(version) => {
                if let (Some(key), Some(ledger)) = (key, &self.ledger) {
                    ledger.record(
                        key.clone(),
                        LedgerEntry {
                            fingerprint: request.fingerprint(),
                            version_id: version.id(),
                        },
                    )?;
                }
                Ok(version)
            }
            Err(err @ MutationError::StaleWrite { .. }) => match key {
                // A duplicate of this request may be what made it stale.
                Some(key) => self.replay(key, request)?.ok_or(err),
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Returns the earlier result for a tokened request, if any.
    fn replay(&self, key: &IdempotencyKey, request: &MutationRequest) -> MutationResult<Option<Version>> {
        let ledger = match &self.ledger {
            Some(ledger) => ledger,
            None => return Ok(None),
        };
        let entry = match ledger.lookup(key)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if entry.fingerprint != request.fingerprint() {
            return Err(MutationError::IdempotencyMismatch {
                token: key.token.clone(),
            });
        }

        self.metrics.increment_idempotent_replays();
        let version_id = entry.version_id.to_string();
        log_event_with_fields(
            Event::IdempotentReplay,
            &[
                ("chain_id", key.chain_id.as_str()),
                ("version_id", version_id.as_str()),
            ],
        );
        Ok(Some(self.store.get_version(entry.version_id)?))
    }

    fn mutate(&self, request: &MutationRequest) -> MutationResult<Version> {
        let stale = |actual_latest| MutationError::StaleWrite {
            chain_id: request.chain_id.clone(),
            expected: request.expected_version,
            actual_latest,
        };

        // 1-2
        let old = match self.detector.check(&request.chain_id, request.expected_version)? {
            ConflictCheck::Current(old) => old,
            ConflictCheck::Conflict(actual) => return Err(stale(actual)),
        };

        // 3. A chain keeps the resource type it was created with. Unknown
        // types still report as unknown.
        if old.resource_type() != request.resource_type {
            self.registry.machine(&request.resource_type)?;
            return Err(MutationError::ResourceTypeMismatch {
                chain_id: request.chain_id.clone(),
                chain_type: old.resource_type().to_string(),
                requested: request.resource_type.clone(),
            });
        }
        let action = self
            .registry
            .resolve(&request.resource_type, old.status(), &request.action_id)?;

        // 4
        let ctx = RuleContext {
            resource_type: &request.resource_type,
            current: &old,
            action_id: &request.action_id,
            arguments: &request.arguments,
            actor: &request.actor,
        };
        for rule in &self.rules {
            rule.check(&ctx)
                .map_err(MutationError::BusinessRuleViolation)?;
        }

        // 5-6
        let (payload, status) = action.apply(old.payload(), &request.arguments);
        let draft = VersionDraft::new(
            status,
            payload,
            action.schema_version(),
            RevisionDetails::now(
                request.action_id.clone(),
                request.arguments.clone(),
                request.actor.clone(),
            ),
        );

        // 7
        let new = self.commit(&request.chain_id, old.id(), draft).map_err(|e| match e {
            CommitError::Stale(actual) => stale(actual),
            CommitError::Failed(e) => e,
        })?;

        self.metrics.increment_mutations_committed();
        let old_id = old.id().to_string();
        let new_id = new.id().to_string();
        let number = new.version_number().to_string();
        log_event_with_fields(
            Event::MutationCommitted,
            &[
                ("action_id", request.action_id.as_str()),
                ("chain_id", request.chain_id.as_str()),
                ("revises", old_id.as_str()),
                ("version_id", new_id.as_str()),
                ("version_number", number.as_str()),
            ],
        );

        // 8. The commit stands even if notification fails.
        match self.notifier.broadcast(old.id(), &new) {
            Ok(delivered) => self.metrics.add_notifications(delivered as u64),
            Err(e) => {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::NotificationFailed,
                    &[
                        ("chain_id", request.chain_id.as_str()),
                        ("reason", reason.as_str()),
                        ("version_id", new_id.as_str()),
                    ],
                );
            }
        }

        // 9
        Ok(new)
    }

    /// Commits with bounded retry of transient failures.
    ///
    /// The draft id is fixed across attempts, so an attempt that reports a
    /// failure but actually landed is recognised by finding the draft id in
    /// the store.
    fn commit(&self, chain_id: &ChainId, old: VersionId, draft: VersionDraft) -> Result<Version, CommitError> {
        let draft_id = draft.id;
        let mut attempt = 1;
        loop {
            match self.store.commit_transition(old, draft.clone()) {
                Ok(version) => return Ok(version),
                Err(StoreError::StaleWrite { actual_latest }) => {
                    if attempt > 1 {
                        if let Ok(landed) = self.store.get_version(draft_id) {
                            return Ok(landed);
                        }
                    }
                    return Err(CommitError::Stale(actual_latest));
                }
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    self.backoff(chain_id, attempt, &e);
                    attempt += 1;
                }
                Err(e) => return Err(CommitError::Failed(self.commit_failure(chain_id, attempt, e))),
            }
        }
    }

    fn backoff(&self, chain_id: &ChainId, attempt: u32, err: &StoreError) {
        self.metrics.increment_commit_retries();
        let delay = self.retry.delay(attempt);
        let attempt_str = attempt.to_string();
        let delay_ms = delay.as_millis().to_string();
        let reason = err.to_string();
        log_event_with_fields(
            Event::CommitRetry,
            &[
                ("attempt", attempt_str.as_str()),
                ("chain_id", chain_id.as_str()),
                ("delay_ms", delay_ms.as_str()),
                ("reason", reason.as_str()),
            ],
        );
        thread::sleep(delay);
    }

    fn commit_failure(&self, chain_id: &ChainId, attempts: u32, err: StoreError) -> MutationError {
        let mapped = match err {
            StoreError::Transient(reason) | StoreError::Fatal(reason) => {
                MutationError::Transaction { attempts, reason }
            }
            other => MutationError::from(other),
        };
        if matches!(mapped, MutationError::Transaction { .. } | MutationError::Corruption(_)) {
            self.metrics.increment_transaction_failures();
            let attempts_str = attempts.to_string();
            let reason = mapped.to_string();
            log_event_with_fields(
                Event::TransactionFailed,
                &[
                    ("attempts", attempts_str.as_str()),
                    ("chain_id", chain_id.as_str()),
                    ("reason", reason.as_str()),
                ],
            );
        }
        mapped
    }

    fn enter(&self, key: &IdempotencyKey) -> MutationResult<Arc<Mutex<()>>> {
        let mut inflight = self.inflight.lock().map_err(|_| MutationError::Transaction {
            attempts: 0,
            reason: "Idempotency lock poisoned".into(),
        })?;
        Ok(Arc::clone(inflight.entry(key.clone()).or_default()))
    }

    fn leave(&self, key: &IdempotencyKey, slot: Arc<Mutex<()>>) {
        if let Ok(mut inflight) = self.inflight.lock() {
            // Clones are only taken under this lock: map + ours means idle.
            if Arc::strong_count(&slot) == 2 {
                inflight.remove(key);
            }
        }
    }
}

enum CommitError {
    Stale(VersionId),
    Failed(MutationError),
}
