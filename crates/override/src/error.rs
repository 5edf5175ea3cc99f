//! Override authority error types.

use thiserror::Error;
use warden_store::StoreError;

use crate::grant::OverrideState;

/// Result alias for override operations.
pub type Result<T> = std::result::Result<T, OverrideError>;

/// Errors that can occur in the override authority.
#[derive(Debug, Error)]
pub enum OverrideError {
    /// No override grant exists with this id.
    #[error("override {override_id} not found")]
    NotFound { override_id: String },

    /// The constraint already has a non-terminal override in flight.
    #[error("constraint {constraint_id} already has a pending override")]
    AlreadyPending { constraint_id: String },

    /// A request parameter failed validation.
    #[error("invalid override request: {0}")]
    ValidationError(String),

    /// The grant was already consumed.
    #[error("override {override_id} was already used")]
    AlreadyUsed { override_id: String },

    /// The grant expired before it could be used.
    #[error("override {override_id} has expired")]
    Expired { override_id: String },

    /// The grant was revoked before it could be used.
    #[error("override {override_id} was revoked")]
    Revoked { override_id: String },

    /// The operation is not legal in the grant's current state.
    #[error("override {override_id} is {state}, operation not permitted")]
    InvalidState {
        override_id: String,
        state: OverrideState,
    },

    /// The out-of-band approval channel failed to deliver the challenge.
    #[error("challenge delivery failed: {0}")]
    ChannelFailed(String),

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The audit trail could not be appended.
    #[error(transparent)]
    Audit(#[from] warden_audit::AuditError),
}
