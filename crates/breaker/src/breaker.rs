//! Circuit breaker service.
//!
//! One breaker document per constraint, mutated exclusively through CAS so
//! that concurrent violation reports from separate agents each land exactly
//! once and a trip is decided by whichever writer's CAS commits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use warden_audit::{AuditActor, AuditRecord, AuditResult, AuditSink};
use warden_store::{fetch, modify, retry, DocumentStore, StoreError};
use warden_types::{Clock, ConstraintId, SessionId};

use crate::config::BreakerConfig;
use crate::error::{BreakerError, Result};
use crate::state::{BreakerDoc, BreakerState, ViolationOutcome};

/// Current schema for breaker documents.
pub const SCHEMA_VERSION: u32 = 1;

fn live_key(constraint_id: &ConstraintId) -> String {
    format!("breaker/{constraint_id}")
}

fn archive_key(constraint_id: &ConstraintId) -> String {
    format!("breaker_archive/{constraint_id}")
}

/// What an enforcement check sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerStatus {
    /// Closed or half-open; the action may proceed.
    Allowed,
    /// Open; blocked until the cooldown elapses.
    Blocked {
        reason: String,
        cooldown_until: DateTime<Utc>,
    },
}

/// Per-constraint circuit breaker over the document store.
pub struct CircuitBreaker {
    store: Arc<dyn DocumentStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
        }
    }

    /// Create the breaker for a constraint if it does not exist yet.
    ///
    /// Called on constraint activation. Idempotent: an existing breaker keeps
    /// its state and violation history, and `config` is ignored for it.
    #[instrument(skip(self, config))]
    pub async fn ensure(
        &self,
        constraint_id: &ConstraintId,
        config: BreakerConfig,
    ) -> Result<BreakerDoc> {
        config.validate()?;
        let key = live_key(constraint_id);
        let now = self.clock.now();
        let id = constraint_id.clone();
        let doc = modify::<BreakerDoc, BreakerDoc, _>(
            self.store.as_ref(),
            self.clock.as_ref(),
            &key,
            SCHEMA_VERSION,
            |prior| {
                let doc = prior.unwrap_or_else(|| BreakerDoc::new(id.clone(), config.clone(), now));
                Ok((doc.clone(), doc))
            },
        )
        .await?;
        Ok(doc)
    }

    /// Record one violation against a constraint.
    ///
    /// Dedup, window counting and trip evaluation happen inside the CAS
    /// round-trip, so two agents reporting simultaneously produce two counted
    /// violations and at most one trip.
    #[instrument(skip(self, action))]
    pub async fn record_violation(
        &self,
        constraint_id: &ConstraintId,
        action: &str,
        session: SessionId,
    ) -> Result<ViolationOutcome> {
        let key = live_key(constraint_id);
        let now = self.clock.now();
        let action_owned = action.to_string();
        let result = modify::<BreakerDoc, ViolationOutcome, _>(
            self.store.as_ref(),
            self.clock.as_ref(),
            &key,
            SCHEMA_VERSION,
            |prior| {
                let mut doc = prior.ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
                let outcome = doc.apply_violation(&action_owned, session.clone(), now);
                Ok((doc, outcome))
            },
        )
        .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(StoreError::NotFound { .. }) => return Err(self.missing(constraint_id).await),
            Err(err) => return Err(err.into()),
        };

        match &outcome {
            ViolationOutcome::Deduplicated => {
                debug!(constraint = %constraint_id, "violation deduplicated against previous");
            }
            ViolationOutcome::Recorded { in_window } => {
                info!(constraint = %constraint_id, in_window, "violation recorded");
                self.audit
                    .append(AuditRecord::new(
                        now,
                        AuditActor::System,
                        "breaker.violation",
                        format!("constraint:{constraint_id}"),
                        AuditResult::Success,
                    ))
                    .await?;
            }
            ViolationOutcome::Tripped { in_window } => {
                warn!(constraint = %constraint_id, in_window, "breaker tripped");
                self.audit
                    .append(AuditRecord::new(
                        now,
                        AuditActor::System,
                        "breaker.trip",
                        format!("constraint:{constraint_id}"),
                        AuditResult::Success,
                    ))
                    .await?;
            }
        }
        Ok(outcome)
    }

    /// Whether the breaker currently blocks matching actions.
    pub async fn check(&self, constraint_id: &ConstraintId) -> Result<BreakerStatus> {
        let doc = self.get(constraint_id).await?;
        let now = self.clock.now();
        match doc.effective_state(now) {
            BreakerState::Open => Ok(BreakerStatus::Blocked {
                reason: format!(
                    "{} violations in the trailing window (threshold {})",
                    doc.counted_violations(now),
                    doc.config.violation_threshold
                ),
                cooldown_until: doc.cooldown_until().unwrap_or(now),
            }),
            BreakerState::Closed | BreakerState::HalfOpen => Ok(BreakerStatus::Allowed),
        }
    }

    /// The live breaker document.
    pub async fn get(&self, constraint_id: &ConstraintId) -> Result<BreakerDoc> {
        match fetch::<BreakerDoc>(
            self.store.as_ref(),
            &live_key(constraint_id),
            SCHEMA_VERSION,
        )
        .await?
        {
            Some(doc) => Ok(doc),
            None => Err(self.missing(constraint_id).await),
        }
    }

    /// Manual reset to Closed. The violation history is retained; the
    /// counted window restarts now.
    #[instrument(skip(self))]
    pub async fn reset(&self, constraint_id: &ConstraintId, actor: AuditActor) -> Result<BreakerDoc> {
        let key = live_key(constraint_id);
        let now = self.clock.now();
        let result = modify::<BreakerDoc, BreakerDoc, _>(
            self.store.as_ref(),
            self.clock.as_ref(),
            &key,
            SCHEMA_VERSION,
            |prior| {
                let mut doc = prior.ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
                doc.reset(now);
                Ok((doc.clone(), doc))
            },
        )
        .await;

        let doc = match result {
            Ok(doc) => doc,
            Err(StoreError::NotFound { .. }) => return Err(self.missing(constraint_id).await),
            Err(err) => return Err(err.into()),
        };

        info!(constraint = %constraint_id, %actor, "breaker manually reset");
        self.audit
            .append(AuditRecord::new(
                now,
                actor,
                "breaker.reset",
                format!("constraint:{constraint_id}"),
                AuditResult::Success,
            ))
            .await?;
        Ok(doc)
    }

    /// Move the breaker document to the archive keyspace.
    ///
    /// Part of the retirement cascade. The live document is copied (state and
    /// full violation history preserved) and then removed with the only CAS
    /// delete in the system. Idempotent: archiving an already-archived
    /// breaker succeeds.
    #[instrument(skip(self))]
    pub async fn archive(&self, constraint_id: &ConstraintId) -> Result<BreakerDoc> {
        let live = live_key(constraint_id);
        let archive = archive_key(constraint_id);
        let mut attempt = 0;
        let archived = loop {
            let Some(current) = self.store.read(&live).await? else {
                // A previous cascade run (or a concurrent one) already moved
                // the document across.
                match fetch::<BreakerDoc>(self.store.as_ref(), &archive, SCHEMA_VERSION).await? {
                    Some(doc) => return Ok(doc),
                    None => return Err(self.missing(constraint_id).await),
                }
            };
            let doc: BreakerDoc = current.envelope.decode(&live, SCHEMA_VERSION)?;
            match self.store.write(&archive, current.envelope, None).await {
                // Conflict means the archive copy already landed.
                Ok(_) | Err(StoreError::Conflict { .. }) => {}
                Err(err) => return Err(err.into()),
            }
            match self.store.delete(&live, current.version).await {
                Ok(()) => break doc,
                Err(StoreError::NotFound { .. }) => break doc,
                Err(StoreError::Conflict { .. }) if attempt < retry::BACKOFF_MS.len() => {
                    // The live document mutated between read and delete;
                    // re-read so the archive copy stays current.
                    tokio::time::sleep(std::time::Duration::from_millis(
                        retry::BACKOFF_MS[attempt],
                    ))
                    .await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        };

        info!(constraint = %constraint_id, "breaker archived");
        self.audit
            .append(AuditRecord::new(
                self.clock.now(),
                AuditActor::System,
                "breaker.archive",
                format!("constraint:{constraint_id}"),
                AuditResult::Success,
            ))
            .await?;
        Ok(archived)
    }

    /// Snapshot of every breaker whose effective state is Open.
    ///
    /// Lock-free: each document is read independently, so the list can be
    /// momentarily stale under concurrent trips. Used for dashboards, not
    /// enforcement.
    pub async fn open_breakers(&self) -> Result<Vec<BreakerDoc>> {
        let now = self.clock.now();
        let mut open = Vec::new();
        for key in self.store.keys("breaker/").await? {
            if let Some(doc) = fetch::<BreakerDoc>(self.store.as_ref(), &key, SCHEMA_VERSION).await?
            {
                if doc.effective_state(now) == BreakerState::Open {
                    open.push(doc);
                }
            }
        }
        Ok(open)
    }

    /// Violations recorded at or after `since`. Consulted by retirement
    /// completion, which requires a quiet sunset period.
    pub async fn violations_since(
        &self,
        constraint_id: &ConstraintId,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        let doc = self.get(constraint_id).await?;
        Ok(doc
            .violations
            .iter()
            .filter(|v| v.timestamp >= since)
            .count() as u32)
    }

    async fn missing(&self, constraint_id: &ConstraintId) -> BreakerError {
        let archived = fetch::<BreakerDoc>(
            self.store.as_ref(),
            &archive_key(constraint_id),
            SCHEMA_VERSION,
        )
        .await;
        match archived {
            Ok(Some(_)) => BreakerError::Archived {
                constraint_id: constraint_id.to_string(),
            },
            _ => BreakerError::NotFound {
                constraint_id: constraint_id.to_string(),
            },
        }
    }
}
