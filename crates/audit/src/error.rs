//! Audit error types.

use thiserror::Error;

/// Result alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Errors that can occur appending to the audit trail.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The record could not be serialized.
    #[error("audit serialization failed: {0}")]
    Serialization(String),

    /// The sink could not be written.
    #[error("audit sink io error: {0}")]
    Io(#[from] std::io::Error),
}
