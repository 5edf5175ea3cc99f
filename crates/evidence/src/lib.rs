//! Warden evidence ledger.
//!
//! Accumulates observations (failure and pattern signals with recurrence,
//! confirmation and source-diversity counters) and decides when the evidence
//! is strong enough to generate a constraint. Observations are never
//! deleted; constraints hold non-owning back-references to them.

pub mod eligibility;
pub mod error;
pub mod ledger;
pub mod observation;

pub use eligibility::{
    Condition, EligibilityReport, MIN_CONFIRMATIONS, MIN_DISTINCT_FILES, MIN_RECURRENCES,
    MIN_UNIQUE_CONFIRMERS,
};
pub use error::{EvidenceError, Result};
pub use ledger::{EvidenceConfig, EvidenceLedger, ObservationSet, OBSERVATIONS_KEY, SCHEMA_VERSION};
pub use observation::{Observation, ObservationKind, SourceRef};
