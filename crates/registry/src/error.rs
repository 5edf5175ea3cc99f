//! Constraint registry error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use warden_evidence::EligibilityReport;
use warden_store::StoreError;

use crate::types::ConstraintStatus;

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur in the constraint registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No constraint exists with this id.
    #[error("constraint {constraint_id} not found")]
    NotFound { constraint_id: String },

    /// A constraint was already generated from this observation.
    #[error("constraint {constraint_id} already exists")]
    AlreadyExists { constraint_id: String },

    /// The requested lifecycle edge is not legal.
    #[error("illegal transition {from} -> {to}")]
    InvalidTransition {
        from: ConstraintStatus,
        to: ConstraintStatus,
    },

    /// Pattern observations never graduate to constraints.
    #[error("pattern observations are not eligible for constraint generation")]
    PatternIneligible,

    /// The observation has not accumulated enough evidence; the report
    /// carries every condition with its pass/fail status.
    #[error("observation not eligible: {report}")]
    NotEligible { report: EligibilityReport },

    /// The 90-day sunset has not elapsed yet.
    #[error("sunset period runs until {until}")]
    SunsetIncomplete { until: DateTime<Utc> },

    /// Violations were recorded during the sunset; the constraint is still
    /// doing work.
    #[error("{count} violation(s) recorded during the sunset period")]
    SunsetViolations { count: u32 },

    /// Retired constraints are immutable.
    #[error("constraint {constraint_id} is retired and immutable")]
    Immutable { constraint_id: String },

    /// The constraint's breaker failed.
    #[error(transparent)]
    Breaker(#[from] warden_breaker::BreakerError),

    /// The constraint's overrides could not be expired.
    #[error(transparent)]
    Override(#[from] warden_override::OverrideError),

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The audit trail could not be appended.
    #[error(transparent)]
    Audit(#[from] warden_audit::AuditError),
}
