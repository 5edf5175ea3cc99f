//! Store error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the persistent state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("document not found: {key}")]
    NotFound { key: String },

    /// Compare-and-swap version mismatch. Always retryable by re-reading.
    #[error("version conflict on {key}: expected {expected}, actual {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A live lock is held by another agent. Retryable with backoff.
    #[error("resource {resource} locked by {holder} until {expires_at}")]
    Busy {
        resource: String,
        holder: String,
        expires_at: DateTime<Utc>,
    },

    /// A lock handle no longer matches the persisted lock (expired and
    /// seized, or already released).
    #[error("lock on {resource} is no longer held: {detail}")]
    LockInvalid { resource: String, detail: String },

    /// The persisted document declares a schema version this build does not
    /// know. Fail closed; manual intervention required.
    #[error("unknown schema version {found} on {key} (supported up to {supported})")]
    SchemaUnknown {
        key: String,
        found: u32,
        supported: u32,
    },

    /// The persisted document could not be parsed. Never repaired
    /// automatically; the caller must decide to reinitialize.
    #[error("corrupt document at {key}: {detail}")]
    Corrupt { key: String, detail: String },

    /// Serialization of a document failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the caller may recover by re-reading and retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Busy { .. })
    }
}
