//! Storage trait definition.
//!
//! Coordination between agents happens exclusively through this interface:
//! compare-and-swap document writes plus TTL locks. No engine component
//! touches a file path directly.

use async_trait::async_trait;
use chrono::Duration;
use warden_types::AgentId;

use crate::envelope::{DocumentEnvelope, VersionedDocument};
use crate::error::Result;
use crate::lock::WriteLock;

/// Versioned key -> JSON-document store with optimistic concurrency.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document and its CAS version. `None` if the key has never
    /// been written.
    async fn read(&self, key: &str) -> Result<Option<VersionedDocument>>;

    /// Write a document.
    ///
    /// `expected = Some(v)` succeeds only if the stored version is still
    /// `v`; `expected = None` creates the key and conflicts if it already
    /// exists. Returns the new version. Writes are atomic: a crash
    /// mid-write never yields a half-written document.
    async fn write(
        &self,
        key: &str,
        envelope: DocumentEnvelope,
        expected: Option<u64>,
    ) -> Result<u64>;

    /// Delete a document under CAS. `expected` follows the same rules as
    /// `write`. Used only for archival moves; audit data is never deleted.
    async fn delete(&self, key: &str, expected: u64) -> Result<()>;

    /// List keys with the given prefix. Read-only snapshot; takes no locks
    /// and tolerates staleness.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Acquire a write lock on a logical resource.
    ///
    /// Fails fast with `Busy` (carrying the holder's identity) when a live
    /// foreign lock exists. Expired locks are seized silently; this is the
    /// crash-recovery path.
    async fn acquire(&self, resource: &str, agent: &AgentId, ttl: Duration) -> Result<WriteLock>;

    /// Heartbeat: extend a held lock's TTL. Fails with `LockInvalid` if the
    /// lock expired and was seized, or was never held.
    async fn refresh(&self, lock: &WriteLock) -> Result<WriteLock>;

    /// Release a held lock. Releasing a lock that was seized after expiry
    /// fails with `LockInvalid` rather than stealing it back.
    async fn release(&self, lock: &WriteLock) -> Result<()>;
}
