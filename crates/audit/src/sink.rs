//! Audit sinks.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::entry::AuditRecord;
use crate::error::{AuditError, Result};

/// Append-only destination for audit records.
///
/// The trait deliberately has no read-back, truncate or rewrite surface;
/// consumers that need to inspect the trail go to the sink implementation
/// directly (or read the file out of band).
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record.
    async fn append(&self, record: AuditRecord) -> Result<()>;
}

/// In-memory audit log for tests and inspection.
#[derive(Default)]
pub struct InMemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records appended so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Records whose action matches exactly.
    pub fn with_action(&self, action: &str) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.action == action)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// JSON-lines file sink: one record per line, opened in append mode on
/// every write so external rotation is safe.
pub struct JsonLinesAuditLog {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl JsonLinesAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        let line =
            serde_json::to_string(&record).map_err(|e| AuditError::Serialization(e.to_string()))?;
        let _guard = self.write_guard.lock().unwrap();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
