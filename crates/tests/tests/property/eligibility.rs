//! Eligibility monotonicity.
//!
//! Evidence counters only grow, so once an observation qualifies for
//! constraint generation no further record/confirm/disconfirm sequence may
//! disqualify it.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use warden_evidence::{EligibilityReport, Observation, ObservationKind, SourceRef};
use warden_types::SessionId;

#[derive(Debug, Clone)]
enum Step {
    Record { file: String },
    Confirm { user: String },
    Disconfirm { user: String },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        "file-[0-3]\\.md".prop_map(|file| Step::Record { file }),
        "[a-e]".prop_map(|user| Step::Confirm { user }),
        "[a-e]".prop_map(|user| Step::Disconfirm { user }),
    ]
}

fn source(file: &str) -> SourceRef {
    SourceRef {
        file: file.into(),
        date: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        session: SessionId::new("s"),
    }
}

/// Mirror of the ledger's counter semantics on a detached observation.
fn apply(obs: &mut Observation, step: &Step) {
    match step {
        Step::Record { file } => {
            obs.r_count += 1;
            obs.sources.push(source(file));
        }
        Step::Confirm { user } => {
            if obs.confirmers.insert(user.clone()) {
                obs.c_count += 1;
            }
        }
        Step::Disconfirm { user } => {
            if obs.disconfirmers.insert(user.clone()) {
                obs.d_count += 1;
            }
        }
    }
}

fn fresh() -> Observation {
    Observation::first(
        ObservationKind::Failure,
        "force push no confirm",
        source("file-0.md"),
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
    )
}

fn qualified() -> Observation {
    let mut obs = fresh();
    obs.sources.push(source("file-1.md"));
    obs.sources.push(source("file-2.md"));
    obs.r_count = 3;
    obs.c_count = 2;
    obs.confirmers.insert("ana".into());
    obs.confirmers.insert("ben".into());
    obs
}

proptest! {
    /// An already-eligible observation stays eligible under any further
    /// activity, disconfirmations included.
    #[test]
    fn eligible_stays_eligible(steps in proptest::collection::vec(step_strategy(), 0..40)) {
        let mut obs = qualified();
        prop_assert!(EligibilityReport::evaluate(&obs).is_eligible());
        for step in &steps {
            apply(&mut obs, step);
            let report = EligibilityReport::evaluate(&obs);
            prop_assert!(report.is_eligible(), "became ineligible after {step:?}: {report}");
        }
    }

    /// Starting from nothing, eligibility never flips back off once reached.
    #[test]
    fn first_eligible_point_is_permanent(steps in proptest::collection::vec(step_strategy(), 0..60)) {
        let mut obs = fresh();
        let mut was_eligible = false;
        for step in &steps {
            apply(&mut obs, step);
            let eligible = EligibilityReport::evaluate(&obs).is_eligible();
            if was_eligible {
                prop_assert!(eligible, "eligibility regressed after {step:?}");
            }
            was_eligible = was_eligible || eligible;
        }
    }

    /// The report always carries all five conditions, whatever the state.
    #[test]
    fn report_is_always_complete(steps in proptest::collection::vec(step_strategy(), 0..20)) {
        let mut obs = fresh();
        for step in &steps {
            apply(&mut obs, step);
        }
        let report = EligibilityReport::evaluate(&obs);
        prop_assert_eq!(report.conditions.len(), 5);
    }
}
