//! TTL-based write locks.
//!
//! Locks guard read-modify-write sequences on a logical resource. There is
//! no heartbeat beyond the TTL: a lock past `expires_at` is void and may be
//! seized by any agent. Holders that need longer must call
//! [`crate::DocumentStore::refresh`] explicitly.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_types::AgentId;

/// Default lock TTL.
pub const DEFAULT_LOCK_TTL_SECS: i64 = 300;

/// A held (or persisted) write lock on a logical resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteLock {
    /// The logical resource the lock covers.
    pub resource: String,
    /// Who holds the lock.
    pub agent: AgentId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Ownership token; release and refresh must present it.
    pub token: Uuid,
}

impl WriteLock {
    /// Create a fresh lock starting now.
    pub fn grant(resource: &str, agent: &AgentId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            resource: resource.to_string(),
            agent: agent.clone(),
            acquired_at: now,
            expires_at: now + ttl,
            token: Uuid::new_v4(),
        }
    }

    /// Whether the lock is void at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Extend the lock by `ttl` from `now`, keeping the token.
    pub fn extended(&self, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            expires_at: now + ttl,
            ..self.clone()
        }
    }
}
