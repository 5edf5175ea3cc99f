//! Versioned document envelope.
//!
//! Every persisted document is wrapped as `{schema_version, data,
//! migration_history}`. The envelope is schema-agnostic; typed access and
//! migration policy live in [`crate::modify`] and the owning service crates.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Record of one schema migration applied to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub from: u32,
    pub to: u32,
    pub migrated_at: DateTime<Utc>,
}

/// Persisted wrapper around a JSON document.
///
/// A missing `schema_version` deserializes as 0 and is treated as the oldest
/// known schema; readers log the distinction loudly (legacy file vs possible
/// corruption) before migrating forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEnvelope {
    #[serde(default)]
    pub schema_version: u32,
    pub data: serde_json::Value,
    #[serde(default)]
    pub migration_history: Vec<MigrationRecord>,
}

impl DocumentEnvelope {
    /// Wrap a serializable value at the given schema version.
    pub fn new<T: Serialize>(schema_version: u32, data: &T) -> Result<Self> {
        Ok(Self {
            schema_version,
            data: serde_json::to_value(data)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            migration_history: Vec::new(),
        })
    }

    /// Decode the payload, failing closed on schema versions newer than
    /// `supported`.
    pub fn decode<T: DeserializeOwned>(&self, key: &str, supported: u32) -> Result<T> {
        if self.schema_version > supported {
            return Err(StoreError::SchemaUnknown {
                key: key.to_string(),
                found: self.schema_version,
                supported,
            });
        }
        serde_json::from_value(self.data.clone()).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            detail: format!("payload does not match schema {}: {}", self.schema_version, e),
        })
    }
}

/// A document together with its CAS version.
///
/// The version is per-key and monotonically increasing, starting at 1 on the
/// first write. It is the token callers hand back on write to detect
/// concurrent modification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedDocument {
    pub envelope: DocumentEnvelope,
    pub version: u64,
}
