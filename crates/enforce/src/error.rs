//! Enforcement coordinator error types.

use thiserror::Error;
use warden_types::ClassifierError;

/// Result alias for enforcement operations.
pub type Result<T> = std::result::Result<T, EnforceError>;

/// Errors that can occur while deciding an action.
///
/// The coordinator has no failure modes of its own; everything here wraps a
/// subsystem error.
#[derive(Debug, Error)]
pub enum EnforceError {
    #[error(transparent)]
    Registry(#[from] warden_registry::RegistryError),

    #[error(transparent)]
    Breaker(#[from] warden_breaker::BreakerError),

    #[error(transparent)]
    Override(#[from] warden_override::OverrideError),

    #[error("classifier failed: {0}")]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Audit(#[from] warden_audit::AuditError),
}
