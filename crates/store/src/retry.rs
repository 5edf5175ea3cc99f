//! Bounded retry with exponential backoff.
//!
//! CAS conflicts and lock contention are the two locally recoverable
//! failures. Both are retried a bounded number of times (backoff 100ms,
//! 200ms, 400ms) and then surfaced to the caller.

use std::future::Future;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::debug;
use warden_types::AgentId;

use crate::error::{Result, StoreError};
use crate::lock::WriteLock;
use crate::traits::DocumentStore;

/// Backoff schedule between attempts.
pub const BACKOFF_MS: [u64; 3] = [100, 200, 400];

/// Run `op` until it succeeds, retrying `Conflict` results through the
/// backoff schedule. Any other error surfaces immediately; after the
/// schedule is exhausted the final `Conflict` surfaces.
pub async fn with_cas_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err @ StoreError::Conflict { .. }) if attempt < BACKOFF_MS.len() => {
                debug!(op = op_name, attempt, "CAS conflict, backing off");
                tokio::time::sleep(StdDuration::from_millis(BACKOFF_MS[attempt])).await;
                attempt += 1;
                let _ = err;
            }
            other => return other,
        }
    }
}

/// Acquire a lock, retrying `Busy` through the backoff schedule (3 attempts
/// total). After that the caller must decide whether to retry or surface
/// contention to the user.
pub async fn acquire_with_retry(
    store: &dyn DocumentStore,
    resource: &str,
    agent: &AgentId,
    ttl: Duration,
) -> Result<WriteLock> {
    let mut attempt = 0;
    loop {
        match store.acquire(resource, agent, ttl).await {
            Err(err @ StoreError::Busy { .. }) if attempt + 1 < 3 => {
                debug!(resource, attempt, "lock busy, backing off");
                tokio::time::sleep(StdDuration::from_millis(BACKOFF_MS[attempt])).await;
                attempt += 1;
                let _ = err;
            }
            other => return other,
        }
    }
}
