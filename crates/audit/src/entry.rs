//! Audit record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who performed an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActor {
    /// A human, identified by name or handle.
    Human(String),
    /// An agent process.
    Agent(String),
    /// The engine itself (timeouts, sweeps, cascades).
    System,
}

impl std::fmt::Display for AuditActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human(name) => write!(f, "human:{name}"),
            Self::Agent(id) => write!(f, "agent:{id}"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Denied { reason: String },
    Failure { reason: String },
}

impl AuditResult {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One immutable audit record.
///
/// Records are append-only: no component in this workspace truncates or
/// rewrites a sink once a record has landed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: AuditActor,
    /// What happened, e.g. `constraint.activate`, `breaker.trip`.
    pub action: String,
    /// The resource acted on, e.g. a constraint or override id.
    pub resource: String,
    pub result: AuditResult,
}

impl AuditRecord {
    /// Create a record stamped at `timestamp`.
    pub fn new(
        timestamp: DateTime<Utc>,
        actor: AuditActor,
        action: impl Into<String>,
        resource: impl Into<String>,
        result: AuditResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            actor,
            action: action.into(),
            resource: resource.into(),
            result,
        }
    }
}
