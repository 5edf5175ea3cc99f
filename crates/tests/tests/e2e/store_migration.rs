//! Document round-trips through the file store, plus a forced migration.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use warden_audit::{AuditActor, InMemoryAuditLog};
use warden_breaker::{BreakerConfig, BreakerDoc, CircuitBreaker};
use warden_evidence::{
    EvidenceConfig, EvidenceLedger, ObservationKind, ObservationSet, OBSERVATIONS_KEY,
};
use warden_registry::{Constraint, ConstraintRegistry, ConstraintStatus};
use warden_store::{DocumentEnvelope, DocumentStore, JsonFileStore};
use warden_types::{ManualClock, Severity, SessionId, TableClassifier};

use crate::support::source;

fn temp_root() -> PathBuf {
    std::env::temp_dir().join(format!("warden_e2e_{}", uuid::Uuid::new_v4()))
}

fn file_harness(root: &PathBuf) -> (Arc<ManualClock>, Arc<JsonFileStore>, Arc<InMemoryAuditLog>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
    ));
    let store = Arc::new(JsonFileStore::new(root, clock.clone()).unwrap());
    (clock, store, Arc::new(InMemoryAuditLog::new()))
}

#[tokio::test]
async fn documents_survive_a_process_restart() {
    let root = temp_root();
    let constraint_id;
    {
        let (clock, store, audit) = file_harness(&root);
        let classifier = Arc::new(TableClassifier::new());
        let ledger = EvidenceLedger::new(
            store.clone(),
            classifier,
            audit.clone(),
            clock.clone(),
            EvidenceConfig::default(),
        );
        let obs = ledger
            .record(
                ObservationKind::Failure,
                "force push no confirm",
                source("retro-a.md", "s-1"),
            )
            .await
            .unwrap();
        ledger
            .record(
                ObservationKind::Failure,
                "force push no confirm",
                source("retro-b.md", "s-2"),
            )
            .await
            .unwrap();
        ledger
            .record(
                ObservationKind::Failure,
                "force push no confirm",
                source("retro-c.md", "s-3"),
            )
            .await
            .unwrap();
        ledger.confirm(&obs.slug, "ana").await.unwrap();
        ledger.confirm(&obs.slug, "ben").await.unwrap();

        let breaker = Arc::new(CircuitBreaker::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let overrides = Arc::new(warden_override::OverrideAuthority::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            Arc::new(warden_override::CapturingChannel::new()),
            warden_override::OverrideConfig::default(),
        ));
        let registry = ConstraintRegistry::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            breaker.clone(),
            overrides,
        );
        let observation = ledger.get(&obs.slug).await.unwrap();
        let constraint = registry
            .generate(&observation, Severity::Critical, "never force push")
            .await
            .unwrap();
        registry
            .activate(&constraint.id, AuditActor::Human("ana".into()))
            .await
            .unwrap();
        clock.advance(Duration::minutes(10));
        breaker
            .record_violation(&constraint.id, "git push -f", SessionId::new("s-1"))
            .await
            .unwrap();
        constraint_id = constraint.id;
    }

    // A fresh store over the same directory sees everything.
    let (_, store, _) = file_harness(&root);
    let set: ObservationSet = warden_store::fetch(
        store.as_ref(),
        OBSERVATIONS_KEY,
        warden_evidence::SCHEMA_VERSION,
    )
    .await
    .unwrap()
    .expect("observation set");
    let obs = set.observations.values().next().expect("one observation");
    assert_eq!(obs.r_count, 3);
    assert_eq!(obs.c_count, 2);

    let constraint: Constraint = warden_store::fetch(
        store.as_ref(),
        &format!("constraint/{constraint_id}"),
        warden_registry::SCHEMA_VERSION,
    )
    .await
    .unwrap()
    .expect("constraint document");
    assert_eq!(constraint.status, ConstraintStatus::Active);
    assert_eq!(constraint.current_version().to_string(), "1.0.0");

    let doc: BreakerDoc = warden_store::fetch(
        store.as_ref(),
        &format!("breaker/{constraint_id}"),
        warden_breaker::SCHEMA_VERSION,
    )
    .await
    .unwrap()
    .expect("breaker document");
    assert_eq!(doc.violations.len(), 1);

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn legacy_document_without_version_migrates_on_next_write() {
    let root = temp_root();
    let (clock, store, audit) = file_harness(&root);

    // A pre-versioning observation file: no schema_version field at all.
    let legacy: DocumentEnvelope = serde_json::from_str(
        r#"{"data": {"observations": {}}}"#,
    )
    .unwrap();
    assert_eq!(legacy.schema_version, 0);
    store.write(OBSERVATIONS_KEY, legacy, None).await.unwrap();

    let ledger = EvidenceLedger::new(
        store.clone(),
        Arc::new(TableClassifier::new()),
        audit,
        clock,
        EvidenceConfig::default(),
    );
    ledger
        .record(
            ObservationKind::Failure,
            "deleted uncommitted work",
            source("retro-a.md", "s-1"),
        )
        .await
        .unwrap();

    let doc = store.read(OBSERVATIONS_KEY).await.unwrap().unwrap();
    assert_eq!(doc.envelope.schema_version, warden_evidence::SCHEMA_VERSION);
    assert_eq!(doc.envelope.migration_history.len(), 1);
    assert_eq!(doc.envelope.migration_history[0].from, 0);
    assert_eq!(
        doc.envelope.migration_history[0].to,
        warden_evidence::SCHEMA_VERSION
    );

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn unknown_schema_version_fails_closed() {
    let root = temp_root();
    let (clock, store, audit) = file_harness(&root);

    let future = DocumentEnvelope::new(99, &ObservationSet::default()).unwrap();
    store.write(OBSERVATIONS_KEY, future, None).await.unwrap();

    let ledger = EvidenceLedger::new(
        store.clone(),
        Arc::new(TableClassifier::new()),
        audit,
        clock,
        EvidenceConfig::default(),
    );
    let err = ledger
        .record(
            ObservationKind::Failure,
            "x",
            source("retro-a.md", "s-1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        warden_evidence::EvidenceError::Store(warden_store::StoreError::SchemaUnknown { .. })
    ));

    let _ = std::fs::remove_dir_all(&root);
}

// The breaker config document type also round-trips untouched; a plain
// serde check keeps the persisted shape honest.
#[test]
fn breaker_config_shape_is_stable() {
    let config = BreakerConfig::default();
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["violation_threshold"], 5);
    assert_eq!(json["window_days"], 30);
    assert_eq!(json["cooldown_hours"], 24);
    assert_eq!(json["dedup_seconds"], 300);
}
