//! Circuit breaker error types.

use thiserror::Error;
use warden_store::StoreError;

/// Result alias for breaker operations.
pub type Result<T> = std::result::Result<T, BreakerError>;

/// Errors that can occur in the circuit breaker.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// No breaker state exists for the constraint.
    #[error("no breaker state for constraint {constraint_id}")]
    NotFound { constraint_id: String },

    /// A configuration value failed validation.
    #[error("invalid breaker config: {0}")]
    InvalidConfig(String),

    /// The breaker was already archived for this constraint.
    #[error("breaker for constraint {constraint_id} is archived")]
    Archived { constraint_id: String },

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The audit trail could not be appended.
    #[error(transparent)]
    Audit(#[from] warden_audit::AuditError),
}
