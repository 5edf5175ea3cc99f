//! Evidence ledger error types.

use thiserror::Error;
use warden_store::StoreError;
use warden_types::ClassifierError;

/// Result alias for ledger operations.
pub type Result<T> = std::result::Result<T, EvidenceError>;

/// Errors that can occur in the evidence ledger.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// The slug does not name a known observation. Confirm/disconfirm never
    /// silently create.
    #[error("unknown observation: {slug}")]
    NotFound { slug: String },

    /// The similarity classifier failed.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The audit trail could not be appended.
    #[error(transparent)]
    Audit(#[from] warden_audit::AuditError),
}
