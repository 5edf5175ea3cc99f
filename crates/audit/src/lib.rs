//! Warden audit trail.
//!
//! Every state-changing operation in the engine (confirm, activate, trip,
//! reset, override approve/consume/revoke, ...) appends one immutable
//! `{timestamp, actor, action, resource, result}` record to an append-only
//! sink. Nothing in this workspace truncates or rewrites the trail.

pub mod entry;
pub mod error;
pub mod sink;

pub use entry::{AuditActor, AuditRecord, AuditResult};
pub use error::{AuditError, Result};
pub use sink::{AuditSink, InMemoryAuditLog, JsonLinesAuditLog};
