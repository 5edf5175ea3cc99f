//! Constraint data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_types::{ConstraintId, ObservationSlug, Severity};

/// Lifecycle status of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintStatus {
    /// Generated but not yet enforced.
    Draft,
    /// Enforced; violations can block.
    Active,
    /// In the 90-day sunset; violations are recorded and warned, never
    /// blocked.
    Retiring,
    /// Permanently out of service. Terminal.
    Retired,
}

impl ConstraintStatus {
    /// Whether actions are still checked against the constraint.
    pub fn is_enforced(&self) -> bool {
        matches!(self, Self::Active | Self::Retiring)
    }
}

impl std::fmt::Display for ConstraintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Retiring => "retiring",
            Self::Retired => "retired",
        };
        write!(f, "{s}")
    }
}

/// Dotted-triple constraint version. Ordered; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ConstraintVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ConstraintVersion {
    pub const INITIAL: Self = Self {
        major: 1,
        minor: 0,
        patch: 0,
    };

    /// Next version for a non-breaking edit.
    pub fn bump_minor(self) -> Self {
        Self {
            minor: self.minor + 1,
            patch: 0,
            ..self
        }
    }

    /// Next version for a breaking edit.
    pub fn bump_major(self) -> Self {
        Self {
            major: self.major + 1,
            minor: 0,
            patch: 0,
        }
    }
}

impl std::fmt::Display for ConstraintVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl From<ConstraintVersion> for String {
    fn from(v: ConstraintVersion) -> Self {
        v.to_string()
    }
}

impl TryFrom<String> for ConstraintVersion {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let mut parts = s.split('.');
        let mut next = |name: &str| {
            parts
                .next()
                .ok_or_else(|| format!("missing {name} in version {s:?}"))?
                .parse::<u32>()
                .map_err(|e| format!("bad {name} in version {s:?}: {e}"))
        };
        let version = Self {
            major: next("major")?,
            minor: next("minor")?,
            patch: next("patch")?,
        };
        if parts.next().is_some() {
            return Err(format!("trailing segments in version {s:?}"));
        }
        Ok(version)
    }
}

/// One entry in a constraint's version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: ConstraintVersion,
    pub date: DateTime<Utc>,
    pub change_summary: String,
    pub breaking: bool,
}

/// A governed constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: ConstraintId,
    pub severity: Severity,
    pub status: ConstraintStatus,
    /// Human-readable description of the behavior the constraint forbids,
    /// fed to the classifier as matching context.
    pub scope: String,
    pub source_observation: ObservationSlug,
    pub auto_generated: bool,
    /// Append-only; the last entry is the current version.
    pub version_history: Vec<VersionEntry>,
    /// Set when the sunset starts, cleared on reactivation.
    pub retiring_since: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Constraint {
    pub fn current_version(&self) -> ConstraintVersion {
        self.version_history
            .last()
            .map(|e| e.version)
            .unwrap_or(ConstraintVersion::INITIAL)
    }

    pub fn is_enforced(&self) -> bool {
        self.status.is_enforced()
    }
}
