//! In-memory store for tests and single-process use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use tracing::warn;
use warden_types::{AgentId, Clock};

use crate::envelope::{DocumentEnvelope, VersionedDocument};
use crate::error::{Result, StoreError};
use crate::lock::WriteLock;
use crate::traits::DocumentStore;

#[derive(Default)]
struct Inner {
    documents: HashMap<String, VersionedDocument>,
    locks: HashMap<String, WriteLock>,
}

/// In-memory [`DocumentStore`].
///
/// The primary test double, and a usable backend for single-process
/// deployments. Semantics (CAS, lock seizure on expiry) are identical to the
/// file store.
#[derive(Clone)]
pub struct InMemoryStore {
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning only happens if a test panicked mid-write; propagate.
        self.inner.lock().expect("store mutex poisoned")
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn read(&self, key: &str) -> Result<Option<VersionedDocument>> {
        Ok(self.lock_inner().documents.get(key).cloned())
    }

    async fn write(
        &self,
        key: &str,
        envelope: DocumentEnvelope,
        expected: Option<u64>,
    ) -> Result<u64> {
        let mut inner = self.lock_inner();
        let current = inner.documents.get(key).map(|d| d.version);
        let new_version = match (expected, current) {
            (None, None) => 1,
            (None, Some(actual)) => {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected: 0,
                    actual,
                })
            }
            (Some(v), Some(actual)) if v == actual => v + 1,
            (Some(v), Some(actual)) => {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected: v,
                    actual,
                })
            }
            (Some(v), None) => {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected: v,
                    actual: 0,
                })
            }
        };
        inner.documents.insert(
            key.to_string(),
            VersionedDocument {
                envelope,
                version: new_version,
            },
        );
        Ok(new_version)
    }

    async fn delete(&self, key: &str, expected: u64) -> Result<()> {
        let mut inner = self.lock_inner();
        match inner.documents.get(key).map(|d| d.version) {
            Some(actual) if actual == expected => {
                inner.documents.remove(key);
                Ok(())
            }
            Some(actual) => Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual,
            }),
            None => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .lock_inner()
            .documents
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn acquire(&self, resource: &str, agent: &AgentId, ttl: Duration) -> Result<WriteLock> {
        let now = self.clock.now();
        let mut inner = self.lock_inner();
        if let Some(existing) = inner.locks.get(resource) {
            if !existing.is_expired(now) {
                return Err(StoreError::Busy {
                    resource: resource.to_string(),
                    holder: existing.agent.to_string(),
                    expires_at: existing.expires_at,
                });
            }
            warn!(
                resource,
                previous_holder = %existing.agent,
                "seizing expired lock"
            );
        }
        let lock = WriteLock::grant(resource, agent, now, ttl);
        inner.locks.insert(resource.to_string(), lock.clone());
        Ok(lock)
    }

    async fn refresh(&self, lock: &WriteLock) -> Result<WriteLock> {
        let now = self.clock.now();
        let mut inner = self.lock_inner();
        match inner.locks.get(&lock.resource) {
            Some(held) if held.token == lock.token && !held.is_expired(now) => {
                let ttl = lock.expires_at - lock.acquired_at;
                let extended = held.extended(now, ttl);
                inner.locks.insert(lock.resource.clone(), extended.clone());
                Ok(extended)
            }
            Some(_) => Err(StoreError::LockInvalid {
                resource: lock.resource.clone(),
                detail: "held by another token".into(),
            }),
            None => Err(StoreError::LockInvalid {
                resource: lock.resource.clone(),
                detail: "not held".into(),
            }),
        }
    }

    async fn release(&self, lock: &WriteLock) -> Result<()> {
        let mut inner = self.lock_inner();
        match inner.locks.get(&lock.resource) {
            Some(held) if held.token == lock.token => {
                inner.locks.remove(&lock.resource);
                Ok(())
            }
            Some(_) => Err(StoreError::LockInvalid {
                resource: lock.resource.clone(),
                detail: "held by another token".into(),
            }),
            None => Err(StoreError::LockInvalid {
                resource: lock.resource.clone(),
                detail: "not held".into(),
            }),
        }
    }
}
