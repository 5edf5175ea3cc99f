//! Warden persistent state store.
//!
//! A generic versioned key -> JSON-document store with optimistic-concurrency
//! (compare-and-swap) writes, atomic write-and-rename persistence, and
//! TTL-based write locks. Every other Warden subsystem coordinates through
//! this layer; there is no in-process mutex spanning agents.

pub mod envelope;
pub mod error;
pub mod file;
pub mod lock;
pub mod memory;
pub mod retry;
pub mod traits;

pub use envelope::{DocumentEnvelope, MigrationRecord, VersionedDocument};
pub use error::{Result, StoreError};
pub use file::JsonFileStore;
pub use lock::{WriteLock, DEFAULT_LOCK_TTL_SECS};
pub use memory::InMemoryStore;
pub use retry::{acquire_with_retry, with_cas_retry};
pub use traits::DocumentStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use warden_types::Clock;

/// Atomically read-modify-write a typed document under CAS.
///
/// `apply` receives the current state (`None` if the key has never been
/// written) and returns the next state plus a caller-visible result. On a
/// version conflict the state is re-read and `apply` runs again against the
/// fresh state, so the semantic delta is reapplied rather than overwriting a
/// concurrent writer's contribution. Bounded by the backoff schedule in
/// [`retry`].
///
/// Documents persisted at an older schema version are migrated forward on
/// the next write, with a [`MigrationRecord`] appended to the envelope.
pub async fn modify<T, R, F>(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    key: &str,
    schema_version: u32,
    mut apply: F,
) -> Result<R>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> Result<(T, R)>,
{
    let mut attempt = 0;
    loop {
        let current = store.read(key).await?;
        let (expected, prior, migrated_from, mut history) = match current {
            Some(doc) => {
                let decoded: T = doc.envelope.decode(key, schema_version)?;
                let from = (doc.envelope.schema_version < schema_version)
                    .then_some(doc.envelope.schema_version);
                if let Some(from) = from {
                    warn!(
                        key,
                        from,
                        to = schema_version,
                        "document at older schema (legacy file or stripped \
                         version field); migrating forward"
                    );
                }
                (
                    Some(doc.version),
                    Some(decoded),
                    from,
                    doc.envelope.migration_history,
                )
            }
            None => (None, None, None, Vec::new()),
        };

        let (next, result) = apply(prior)?;
        let mut envelope = DocumentEnvelope::new(schema_version, &next)?;
        if let Some(from) = migrated_from {
            history.push(MigrationRecord {
                from,
                to: schema_version,
                migrated_at: clock.now(),
            });
        }
        envelope.migration_history = history;

        match store.write(key, envelope, expected).await {
            Ok(_) => return Ok(result),
            Err(err @ StoreError::Conflict { .. }) if attempt < retry::BACKOFF_MS.len() => {
                // Lost the race; re-read and reapply the delta.
                warn!(key, attempt, "CAS conflict in modify, reapplying delta");
                tokio::time::sleep(std::time::Duration::from_millis(
                    retry::BACKOFF_MS[attempt],
                ))
                .await;
                attempt += 1;
                let _ = err;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Read a typed document without modifying it.
///
/// Returns `None` if the key has never been written. Older schema versions
/// decode (with a warning) but are not migrated until the next write.
pub async fn fetch<T>(
    store: &dyn DocumentStore,
    key: &str,
    schema_version: u32,
) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    match store.read(key).await? {
        Some(doc) => {
            if doc.envelope.schema_version < schema_version {
                warn!(
                    key,
                    from = doc.envelope.schema_version,
                    to = schema_version,
                    "reading document at older schema"
                );
            }
            Ok(Some(doc.envelope.decode(key, schema_version)?))
        }
        None => Ok(None),
    }
}
