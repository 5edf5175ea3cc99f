//! Constraint-generation eligibility.
//!
//! Five independent conditions, all evaluated explicitly so a report can
//! state the pass/fail status of every one, not just the first failure.

use serde::{Deserialize, Serialize};

use crate::observation::{Observation, ObservationKind};

/// Minimum recurrences before a failure can graduate.
pub const MIN_RECURRENCES: u32 = 3;
/// Minimum confirmations.
pub const MIN_CONFIRMATIONS: u32 = 2;
/// Minimum distinct confirming users.
pub const MIN_UNIQUE_CONFIRMERS: usize = 2;
/// Minimum distinct source files.
pub const MIN_DISTINCT_FILES: usize = 2;

/// One evaluated eligibility condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub required: String,
    pub actual: String,
    pub passed: bool,
}

impl Condition {
    fn new(name: &str, required: impl ToString, actual: impl ToString, passed: bool) -> Self {
        Self {
            name: name.to_string(),
            required: required.to_string(),
            actual: actual.to_string(),
            passed,
        }
    }
}

/// Full eligibility evaluation for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub slug: String,
    pub conditions: Vec<Condition>,
}

impl EligibilityReport {
    /// Evaluate all five conditions. No short-circuiting: every condition
    /// is computed even when an earlier one already failed.
    pub fn evaluate(observation: &Observation) -> Self {
        let kind_is_failure = observation.kind == ObservationKind::Failure;
        let recurrences = observation.r_count;
        let confirmations = observation.c_count;
        let unique = observation.unique_confirmers();
        let files = observation.distinct_source_files();

        let conditions = vec![
            Condition::new(
                "kind_is_failure",
                "Failure",
                format!("{:?}", observation.kind),
                kind_is_failure,
            ),
            Condition::new(
                "recurrences",
                format!(">= {MIN_RECURRENCES}"),
                recurrences,
                recurrences >= MIN_RECURRENCES,
            ),
            Condition::new(
                "confirmations",
                format!(">= {MIN_CONFIRMATIONS}"),
                confirmations,
                confirmations >= MIN_CONFIRMATIONS,
            ),
            Condition::new(
                "unique_confirmers",
                format!(">= {MIN_UNIQUE_CONFIRMERS}"),
                unique,
                unique >= MIN_UNIQUE_CONFIRMERS,
            ),
            Condition::new(
                "distinct_source_files",
                format!(">= {MIN_DISTINCT_FILES}"),
                files,
                files >= MIN_DISTINCT_FILES,
            ),
        ];

        Self {
            slug: observation.slug.to_string(),
            conditions,
        }
    }

    /// Whether every condition passed.
    pub fn is_eligible(&self) -> bool {
        self.conditions.iter().all(|c| c.passed)
    }

    /// The conditions that failed.
    pub fn failed_conditions(&self) -> Vec<&Condition> {
        self.conditions.iter().filter(|c| !c.passed).collect()
    }
}

impl std::fmt::Display for EligibilityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.slug)?;
        for c in &self.conditions {
            write!(
                f,
                " {}={} (required {}, actual {})",
                c.name,
                if c.passed { "pass" } else { "fail" },
                c.required,
                c.actual
            )?;
        }
        Ok(())
    }
}
