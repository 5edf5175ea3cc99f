//! Concurrent violation reports: every one counted, trip exactly once.

use chrono::Duration;
use warden_breaker::{BreakerConfig, BreakerState};
use warden_types::{Clock, ConstraintId, SessionId, TableClassifier};

use crate::support::harness;

#[tokio::test]
async fn concurrent_violations_all_count_and_trip_once() {
    let h = harness(TableClassifier::new());
    let id = ConstraintId::new("no-force-push");
    h.breaker.ensure(&id, BreakerConfig::default()).await.unwrap();

    // Three spaced violations leave the breaker two short of the threshold.
    for i in 0..3 {
        h.clock.advance(Duration::minutes(10));
        h.breaker
            .record_violation(&id, &format!("early {i}"), SessionId::new("s"))
            .await
            .unwrap();
    }

    // Four agents report distinct violations at the same instant. The CAS
    // loop serializes them: whichever write lands fifth trips, the rest
    // record into the already-open breaker.
    let mut handles = Vec::new();
    for i in 0..4 {
        let breaker = h.breaker.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            breaker
                .record_violation(&id, &format!("racing {i}"), SessionId::new("s"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let doc = h.breaker.get(&id).await.unwrap();
    assert_eq!(doc.violations.len(), 7, "no report lost, none double-counted");
    assert_eq!(doc.trip_count, 1);
    assert_eq!(doc.effective_state(h.clock.now()), BreakerState::Open);
    assert_eq!(h.audit.with_action("breaker.trip").len(), 1);
}
