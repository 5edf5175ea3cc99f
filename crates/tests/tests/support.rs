//! Shared fixture plumbing for the cross-crate suites.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use warden_audit::InMemoryAuditLog;
use warden_breaker::CircuitBreaker;
use warden_enforce::EnforcementCoordinator;
use warden_evidence::{EvidenceConfig, EvidenceLedger, ObservationKind, SourceRef};
use warden_override::{
    CapturingChannel, ChallengeOutcome, OverrideAuthority, OverrideConfig, OverrideGrant,
};
use warden_registry::ConstraintRegistry;
use warden_store::InMemoryStore;
use warden_types::{ActionIntent, ManualClock, ObservationSlug, SessionId, TableClassifier};

/// The full engine over an in-memory store, with a manual clock.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStore>,
    pub audit: Arc<InMemoryAuditLog>,
    pub channel: Arc<CapturingChannel>,
    pub ledger: EvidenceLedger,
    pub breaker: Arc<CircuitBreaker>,
    pub overrides: Arc<OverrideAuthority>,
    pub registry: Arc<ConstraintRegistry>,
    pub coordinator: EnforcementCoordinator,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub fn harness(classifier: TableClassifier) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(InMemoryStore::new(clock.clone()));
    let audit = Arc::new(InMemoryAuditLog::new());
    let channel = Arc::new(CapturingChannel::new());
    let classifier = Arc::new(classifier);

    let ledger = EvidenceLedger::new(
        store.clone(),
        classifier.clone(),
        audit.clone(),
        clock.clone(),
        EvidenceConfig::default(),
    );
    let breaker = Arc::new(CircuitBreaker::new(
        store.clone(),
        audit.clone(),
        clock.clone(),
    ));
    let overrides = Arc::new(OverrideAuthority::new(
        store.clone(),
        audit.clone(),
        clock.clone(),
        channel.clone(),
        OverrideConfig::default(),
    ));
    let registry = Arc::new(ConstraintRegistry::new(
        store.clone(),
        audit.clone(),
        clock.clone(),
        breaker.clone(),
        overrides.clone(),
    ));
    let coordinator = EnforcementCoordinator::new(
        registry.clone(),
        breaker.clone(),
        overrides.clone(),
        classifier,
        audit.clone(),
        clock.clone(),
    );

    Harness {
        clock,
        store,
        audit,
        channel,
        ledger,
        breaker,
        overrides,
        registry,
        coordinator,
    }
}

/// Classifier used throughout: force pushes are a confident destructive
/// match against the force-push scope.
pub fn force_push_classifier() -> TableClassifier {
    TableClassifier::new().with_match(
        "git push -f",
        "force push",
        ActionIntent::Destructive,
        0.95,
    )
}

pub fn source(file: &str, session: &str) -> SourceRef {
    SourceRef {
        file: file.into(),
        date: start(),
        session: SessionId::new(session),
    }
}

/// Accumulate the canonical eligible observation: three recurrences from
/// three files, two confirmations from two users.
pub async fn accumulate_evidence(h: &Harness) -> ObservationSlug {
    let obs = h
        .ledger
        .record(
            ObservationKind::Failure,
            "force push no confirm",
            source("retro-a.md", "s-1"),
        )
        .await
        .unwrap();
    h.ledger
        .record(
            ObservationKind::Failure,
            "force push no confirm",
            source("retro-b.md", "s-2"),
        )
        .await
        .unwrap();
    h.ledger
        .record(
            ObservationKind::Failure,
            "force push no confirm",
            source("retro-c.md", "s-3"),
        )
        .await
        .unwrap();
    h.ledger.confirm(&obs.slug, "ana").await.unwrap();
    h.ledger.confirm(&obs.slug, "ben").await.unwrap();
    obs.slug
}

/// Request and approve an override through the capturing channel.
pub async fn approved_override(
    h: &Harness,
    constraint_id: &warden_types::ConstraintId,
    human: &str,
) -> OverrideGrant {
    let grant = h
        .overrides
        .request(
            constraint_id,
            "deliberate exception",
            chrono::Duration::hours(1),
            &warden_types::AgentId::new("agent-1"),
        )
        .await
        .unwrap();
    let token = h.channel.last_token().unwrap();
    match h.overrides.respond(&grant.id, &token, human).await.unwrap() {
        ChallengeOutcome::Approved(active) => active,
        other => panic!("expected approval, got {other:?}"),
    }
}
