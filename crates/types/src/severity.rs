//! Constraint severity scale.

use serde::{Deserialize, Serialize};

/// How serious a violation of a constraint is.
///
/// Variants are declared least-severe-first so the derived ordering makes
/// `Severity::Critical > Severity::Minor` comparisons read naturally at
/// call sites.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Important,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minor => write!(f, "minor"),
            Self::Important => write!(f, "important"),
            Self::Critical => write!(f, "critical"),
        }
    }
}
