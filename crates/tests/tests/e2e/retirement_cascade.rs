//! Retirement cascade: breaker archived, overrides expired, consume loses.

use chrono::Duration;
use warden_audit::AuditActor;
use warden_breaker::{BreakerDoc, BreakerError};
use warden_override::OverrideError;
use warden_registry::{ConstraintStatus, RegistryError, SUNSET_DAYS};
use warden_types::{ConstraintId, Severity, SessionId};

use crate::support::{accumulate_evidence, approved_override, force_push_classifier, harness, Harness};

async fn active_constraint(h: &Harness) -> ConstraintId {
    let slug = accumulate_evidence(h).await;
    let observation = h.ledger.get(&slug).await.unwrap();
    let constraint = h
        .registry
        .generate(
            &observation,
            Severity::Important,
            "never force push to shared branches",
        )
        .await
        .unwrap();
    h.registry
        .activate(&constraint.id, AuditActor::Human("ana".into()))
        .await
        .unwrap();
    constraint.id
}

#[tokio::test]
async fn cascade_archives_history_and_expires_overrides() {
    let h = harness(force_push_classifier());
    let id = active_constraint(&h).await;

    // Violations before the sunset; they must survive archival.
    for i in 0..3 {
        h.clock.advance(Duration::minutes(10));
        h.breaker
            .record_violation(&id, &format!("git push -f v{i}"), SessionId::new("s-1"))
            .await
            .unwrap();
    }
    let grant = approved_override(&h, &id, "ana").await;

    h.registry.retire(&id, AuditActor::System).await.unwrap();
    h.clock.advance(Duration::days(SUNSET_DAYS + 1));
    let retired = h
        .registry
        .complete_retirement(&id, AuditActor::System)
        .await
        .unwrap();
    assert_eq!(retired.status, ConstraintStatus::Retired);

    // The live breaker document is gone; the archive keeps the history.
    let err = h
        .breaker
        .record_violation(&id, "late", SessionId::new("s-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BreakerError::Archived { .. }));
    let archived: BreakerDoc = warden_store::fetch(
        h.store.as_ref(),
        &format!("breaker_archive/{id}"),
        warden_breaker::SCHEMA_VERSION,
    )
    .await
    .unwrap()
    .expect("archive document");
    assert_eq!(archived.violations.len(), 3);

    // The in-flight grant lost the race with retirement.
    let err = h
        .overrides
        .consume(&grant.id, "git push -f origin main")
        .await
        .unwrap_err();
    assert!(matches!(err, OverrideError::Expired { .. }));
}

#[tokio::test]
async fn violations_during_sunset_hold_retirement_open() {
    let h = harness(force_push_classifier());
    let id = active_constraint(&h).await;
    h.registry.retire(&id, AuditActor::System).await.unwrap();

    // A sunset violation arrives through enforcement (warn, never block).
    h.clock.advance(Duration::days(10));
    let decision = h
        .coordinator
        .check_action(&id, "git push -f origin main", &SessionId::new("s-1"))
        .await
        .unwrap();
    assert!(!decision.is_blocked());

    h.clock.advance(Duration::days(SUNSET_DAYS));
    let err = h
        .registry
        .complete_retirement(&id, AuditActor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::SunsetViolations { count: 1 }));

    // Reactivate, retire again, and let a clean sunset complete.
    h.registry
        .reactivate(&id, AuditActor::Human("ana".into()))
        .await
        .unwrap();
    h.registry.retire(&id, AuditActor::System).await.unwrap();
    h.clock.advance(Duration::days(SUNSET_DAYS + 1));
    let retired = h
        .registry
        .complete_retirement(&id, AuditActor::System)
        .await
        .unwrap();
    assert_eq!(retired.status, ConstraintStatus::Retired);
}
