//! JSON-file backed store.
//!
//! One file per key under a root directory; keys may contain `/` and map to
//! subdirectories. All writes are atomic (serialize to `<file>.tmp`, then
//! rename over the target) so a crash mid-write never yields a half-written
//! document. Locks are separate `.lock` files with the same discipline.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;
use warden_types::{AgentId, Clock};

use crate::envelope::{DocumentEnvelope, VersionedDocument};
use crate::error::{Result, StoreError};
use crate::lock::WriteLock;
use crate::traits::DocumentStore;

/// On-disk shape: the CAS version rides next to the envelope so a reader
/// always sees a consistent pair.
#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    version: u64,
    envelope: DocumentEnvelope,
}

/// File-backed [`DocumentStore`].
pub struct JsonFileStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    /// Serializes every read-validate-rename sequence. Without it two
    /// writers can read the same version, both pass the CAS check and both
    /// rename, losing one delta. Cross-process writers coordinate through
    /// the lock files.
    mutate: Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join("locks"))?;
        Ok(Self {
            root,
            clock,
            mutate: Mutex::new(()),
        })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                detail: "invalid key".into(),
            });
        }
        Ok(self.root.join(format!("{key}.json")))
    }

    fn lock_path(&self, resource: &str) -> PathBuf {
        self.root
            .join("locks")
            .join(format!("{}.lock", resource.replace('/', "__")))
    }

    fn atomic_write(path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_document(&self, key: &str) -> Result<Option<StoredDocument>> {
        let path = self.document_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let doc: StoredDocument =
            serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                detail: e.to_string(),
            })?;
        Ok(Some(doc))
    }

    fn read_lock(&self, resource: &str) -> Result<Option<WriteLock>> {
        let path = self.lock_path(resource);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let lock: WriteLock = serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
            key: format!("lock:{resource}"),
            detail: e.to_string(),
        })?;
        Ok(Some(lock))
    }

    fn write_lock_file(&self, lock: &WriteLock) -> Result<()> {
        let json = serde_json::to_string_pretty(lock)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Self::atomic_write(&self.lock_path(&lock.resource), &json)
    }

    fn collect_keys(dir: &Path, rel: &str, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            if path.is_dir() {
                if rel.is_empty() && name == "locks" {
                    continue;
                }
                let child = if rel.is_empty() {
                    name
                } else {
                    format!("{rel}/{name}")
                };
                Self::collect_keys(&path, &child, out)?;
            } else if let Some(stem) = name.strip_suffix(".json") {
                let key = if rel.is_empty() {
                    stem.to_string()
                } else {
                    format!("{rel}/{stem}")
                };
                out.push(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn read(&self, key: &str) -> Result<Option<VersionedDocument>> {
        Ok(self.read_document(key)?.map(|d| VersionedDocument {
            envelope: d.envelope,
            version: d.version,
        }))
    }

    async fn write(
        &self,
        key: &str,
        envelope: DocumentEnvelope,
        expected: Option<u64>,
    ) -> Result<u64> {
        let _guard = self.mutate.lock().unwrap();
        let current = self.read_document(key)?.map(|d| d.version);
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
            (Some(v), actual) => {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected: v,
                    actual: actual.unwrap_or(0),
                })
            }
        };
        let stored = StoredDocument {
            version: new_version,
            envelope,
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Self::atomic_write(&self.document_path(key)?, &json)?;
        Ok(new_version)
    }

    async fn delete(&self, key: &str, expected: u64) -> Result<()> {
        let _guard = self.mutate.lock().unwrap();
        match self.read_document(key)? {
            Some(doc) if doc.version == expected => {
                std::fs::remove_file(self.document_path(key)?)?;
                Ok(())
            }
            Some(doc) => Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual: doc.version,
            }),
            None => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        Self::collect_keys(&self.root, "", &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn acquire(&self, resource: &str, agent: &AgentId, ttl: Duration) -> Result<WriteLock> {
        let _guard = self.mutate.lock().unwrap();
        let now = self.clock.now();
        if let Some(existing) = self.read_lock(resource)? {
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
        self.write_lock_file(&lock)?;
        Ok(lock)
    }

    async fn refresh(&self, lock: &WriteLock) -> Result<WriteLock> {
        let _guard = self.mutate.lock().unwrap();
        let now = self.clock.now();
        match self.read_lock(&lock.resource)? {
            Some(held) if held.token == lock.token && !held.is_expired(now) => {
                let ttl = lock.expires_at - lock.acquired_at;
                let extended = held.extended(now, ttl);
                self.write_lock_file(&extended)?;
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
        let _guard = self.mutate.lock().unwrap();
        match self.read_lock(&lock.resource)? {
            Some(held) if held.token == lock.token => {
                std::fs::remove_file(self.lock_path(&lock.resource))?;
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
