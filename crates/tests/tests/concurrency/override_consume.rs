//! Exactly-once override consumption under contention.

use warden_override::OverrideError;
use warden_types::ConstraintId;

use crate::support::{approved_override, force_push_classifier, harness};

#[tokio::test]
async fn concurrent_consumes_yield_exactly_one_grant() {
    let h = harness(force_push_classifier());
    let active = approved_override(&h, &ConstraintId::new("no-force-push"), "ana").await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let overrides = h.overrides.clone();
        let id = active.id.clone();
        handles.push(tokio::spawn(async move {
            overrides.consume(&id, &format!("attempt {i}")).await
        }));
    }

    let mut oks = 0;
    let mut already_used = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(grant) => {
                assert!(grant.used);
                oks += 1;
            }
            Err(OverrideError::AlreadyUsed { .. }) => already_used += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(oks, 1);
    assert_eq!(already_used, 3);

    // One consumption audited, not four.
    assert_eq!(h.audit.with_action("override.consume").len(), 1);
}
