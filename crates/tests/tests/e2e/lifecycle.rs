//! Full lifecycle: evidence accumulation through breaker re-trip.
//!
//! One failure pattern ("force push without confirmation") is observed three
//! times, confirmed twice, graduates to an active constraint, trips its
//! breaker after five violations, cools down into probation and re-trips on
//! the probe violation.

use chrono::Duration;
use warden_audit::AuditActor;
use warden_breaker::{BreakerState, BreakerStatus};
use warden_enforce::Decision;
use warden_registry::ConstraintStatus;
use warden_types::Clock;
use warden_types::{ConstraintId, Severity, SessionId};

use crate::support::{accumulate_evidence, force_push_classifier, harness};

#[tokio::test]
async fn evidence_to_active_constraint_to_breaker_retrip() {
    let h = harness(force_push_classifier());

    // Evidence accumulates until every eligibility condition passes.
    let slug = accumulate_evidence(&h).await;
    let report = h.ledger.eligibility(&slug).await.unwrap();
    assert!(report.is_eligible(), "{report}");

    // Graduation lands in Draft; activation starts enforcement.
    let observation = h.ledger.get(&slug).await.unwrap();
    let constraint = h
        .registry
        .generate(
            &observation,
            Severity::Critical,
            "never force push to shared branches",
        )
        .await
        .unwrap();
    assert_eq!(constraint.status, ConstraintStatus::Draft);
    let constraint = h
        .registry
        .activate(&constraint.id, AuditActor::Human("ana".into()))
        .await
        .unwrap();
    assert_eq!(constraint.status, ConstraintStatus::Active);

    // Five distinct matching actions: every one blocks, the fifth trips.
    for i in 1..=5 {
        h.clock.advance(Duration::minutes(10));
        let decision = h
            .coordinator
            .check_action(
                &constraint.id,
                &format!("git push -f origin branch-{i}"),
                &SessionId::new("s-9"),
            )
            .await
            .unwrap();
        assert!(decision.is_blocked(), "violation {i} should block");
    }
    let doc = h.breaker.get(&constraint.id).await.unwrap();
    assert_eq!(doc.trip_count, 1);
    assert_eq!(doc.violations.len(), 5);
    assert!(matches!(
        h.breaker.check(&constraint.id).await.unwrap(),
        BreakerStatus::Blocked { .. }
    ));
    assert_eq!(h.audit.with_action("breaker.trip").len(), 1);

    // While open, the block reports the cooldown instead of recording more.
    let decision = h
        .coordinator
        .check_action(
            &constraint.id,
            "git push -f origin main",
            &SessionId::new("s-9"),
        )
        .await
        .unwrap();
    match decision {
        Decision::Block { guidance, .. } => assert!(guidance.contains("blocked until")),
        other => panic!("expected block, got {other:?}"),
    }
    assert_eq!(h.breaker.get(&constraint.id).await.unwrap().violations.len(), 5);

    // Cooldown elapses into probation.
    h.clock.advance(Duration::hours(24));
    assert_eq!(
        h.breaker
            .get(&constraint.id)
            .await
            .unwrap()
            .effective_state(h.clock.now()),
        BreakerState::HalfOpen
    );

    // One probe violation re-trips immediately with a fresh cooldown.
    let tripped_at = h.clock.now();
    let decision = h
        .coordinator
        .check_action(
            &constraint.id,
            "git push -f origin main again",
            &SessionId::new("s-9"),
        )
        .await
        .unwrap();
    assert!(decision.is_blocked());
    let doc = h.breaker.get(&constraint.id).await.unwrap();
    assert_eq!(doc.trip_count, 2);
    assert_eq!(doc.cooldown_until(), Some(tripped_at + Duration::hours(24)));
    assert_eq!(h.audit.with_action("breaker.trip").len(), 2);
}

#[tokio::test]
async fn insufficient_evidence_never_graduates() {
    let h = harness(force_push_classifier());
    let obs = h
        .ledger
        .record(
            warden_evidence::ObservationKind::Failure,
            "force push no confirm",
            crate::support::source("retro-a.md", "s-1"),
        )
        .await
        .unwrap();
    h.ledger.confirm(&obs.slug, "ana").await.unwrap();

    let observation = h.ledger.get(&obs.slug).await.unwrap();
    let err = h
        .registry
        .generate(&observation, Severity::Critical, "scope")
        .await
        .unwrap_err();
    match err {
        warden_registry::RegistryError::NotEligible { report } => {
            // Every failing condition is named, not just the first.
            assert!(report.failed_conditions().len() >= 2, "{report}");
        }
        other => panic!("expected NotEligible, got {other}"),
    }
    assert!(h
        .registry
        .get(&ConstraintId::new(obs.slug.as_str()))
        .await
        .is_err());
}
