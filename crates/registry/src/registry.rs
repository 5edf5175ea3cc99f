//! Constraint registry service.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, instrument, warn};
use warden_audit::{AuditActor, AuditRecord, AuditResult, AuditSink};
use warden_breaker::{BreakerConfig, BreakerError, CircuitBreaker};
use warden_evidence::{EligibilityReport, Observation, ObservationKind};
use warden_override::OverrideAuthority;
use warden_store::{fetch, modify, DocumentStore, StoreError};
use warden_types::{Clock, ConstraintId, Severity};

use crate::error::{RegistryError, Result};
use crate::types::{Constraint, ConstraintStatus, ConstraintVersion, VersionEntry};

/// Current schema for constraint documents.
pub const SCHEMA_VERSION: u32 = 1;

/// Days a retiring constraint stays in sunset before it can be retired.
pub const SUNSET_DAYS: i64 = 90;

fn doc_key(id: &ConstraintId) -> String {
    format!("constraint/{id}")
}

/// Owns constraint lifecycle and versioning; drives the retirement cascade
/// across the breaker and override subsystems.
pub struct ConstraintRegistry {
    store: Arc<dyn DocumentStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    breaker: Arc<CircuitBreaker>,
    overrides: Arc<OverrideAuthority>,
}

impl ConstraintRegistry {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        breaker: Arc<CircuitBreaker>,
        overrides: Arc<OverrideAuthority>,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            breaker,
            overrides,
        }
    }

    /// Generate a Draft constraint from an eligible observation.
    ///
    /// Pattern observations are rejected outright, before any counter is
    /// consulted. An ineligible failure observation is rejected with the
    /// full condition report. Generation never skips Draft.
    #[instrument(skip(self, observation, scope))]
    pub async fn generate(
        &self,
        observation: &Observation,
        severity: Severity,
        scope: &str,
    ) -> Result<Constraint> {
        if observation.kind == ObservationKind::Pattern {
            return Err(RegistryError::PatternIneligible);
        }
        let report = EligibilityReport::evaluate(observation);
        if !report.is_eligible() {
            return Err(RegistryError::NotEligible { report });
        }

        let now = self.clock.now();
        let id = ConstraintId::new(observation.slug.as_str());
        let constraint = Constraint {
            id: id.clone(),
            severity,
            status: ConstraintStatus::Draft,
            scope: scope.to_string(),
            source_observation: observation.slug.clone(),
            auto_generated: true,
            version_history: vec![VersionEntry {
                version: ConstraintVersion::INITIAL,
                date: now,
                change_summary: "generated from accumulated failure evidence".to_string(),
                breaking: false,
            }],
            retiring_since: None,
            created: now,
            updated: now,
        };

        let envelope = warden_store::DocumentEnvelope::new(SCHEMA_VERSION, &constraint)?;
        match self.store.write(&doc_key(&id), envelope, None).await {
            Ok(_) => {}
            Err(StoreError::Conflict { .. }) => {
                return Err(RegistryError::AlreadyExists {
                    constraint_id: id.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        }

        info!(constraint = %id, %severity, "constraint generated as draft");
        self.audit
            .append(AuditRecord::new(
                now,
                AuditActor::System,
                "constraint.generate",
                format!("constraint:{id}"),
                AuditResult::Success,
            ))
            .await?;
        Ok(constraint)
    }

    /// Draft -> Active. Creates the constraint's breaker, Closed.
    #[instrument(skip(self))]
    pub async fn activate(&self, id: &ConstraintId, actor: AuditActor) -> Result<Constraint> {
        let constraint = self
            .step(id, ConstraintStatus::Active, |c| {
                c.retiring_since = None;
            })
            .await?;
        self.breaker.ensure(id, BreakerConfig::default()).await?;
        self.audited(&constraint, "constraint.activate", actor).await?;
        Ok(constraint)
    }

    /// Active -> Retiring. Starts the 90-day sunset.
    #[instrument(skip(self))]
    pub async fn retire(&self, id: &ConstraintId, actor: AuditActor) -> Result<Constraint> {
        let now = self.clock.now();
        let constraint = self
            .step(id, ConstraintStatus::Retiring, |c| {
                c.retiring_since = Some(now);
            })
            .await?;
        self.audited(&constraint, "constraint.retire", actor).await?;
        Ok(constraint)
    }

    /// Retiring -> Active; the only backward edge in the lifecycle.
    #[instrument(skip(self))]
    pub async fn reactivate(&self, id: &ConstraintId, actor: AuditActor) -> Result<Constraint> {
        let constraint = self
            .step(id, ConstraintStatus::Active, |c| {
                c.retiring_since = None;
            })
            .await?;
        self.audited(&constraint, "constraint.reactivate", actor).await?;
        Ok(constraint)
    }

    /// Retiring -> Retired, gated on a completed, quiet sunset.
    ///
    /// Requires the full sunset elapsed and zero violations recorded during
    /// it. On success the cascade runs: the breaker document moves to the
    /// archive keyspace and every non-terminal override for the constraint
    /// is expired. Retirement wins any race with an in-flight override
    /// consumption.
    #[instrument(skip(self))]
    pub async fn complete_retirement(
        &self,
        id: &ConstraintId,
        actor: AuditActor,
    ) -> Result<Constraint> {
        let now = self.clock.now();
        let current = self.get(id).await?;
        if current.status != ConstraintStatus::Retiring {
            return Err(RegistryError::InvalidTransition {
                from: current.status,
                to: ConstraintStatus::Retired,
            });
        }
        let started = current.retiring_since.unwrap_or(current.updated);
        let until = started + Duration::days(SUNSET_DAYS);
        if now < until {
            return Err(RegistryError::SunsetIncomplete { until });
        }
        match self.breaker.violations_since(id, started).await {
            Ok(0) => {}
            Ok(count) => return Err(RegistryError::SunsetViolations { count }),
            // No breaker means no violations; nothing to gate on.
            Err(BreakerError::NotFound { .. }) | Err(BreakerError::Archived { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let constraint = self.step(id, ConstraintStatus::Retired, |_| {}).await?;

        // Cascade. The constraint is already Retired, so a consume racing
        // with this sees its override expired.
        match self.breaker.archive(id).await {
            Ok(_) => {}
            Err(BreakerError::NotFound { .. }) => {
                warn!(constraint = %id, "no breaker document to archive");
            }
            Err(err) => return Err(err.into()),
        }
        let expired = self.overrides.expire_for_constraint(id).await?;
        info!(constraint = %id, expired_overrides = expired, "retirement completed");

        self.audited(&constraint, "constraint.complete_retirement", actor)
            .await?;
        Ok(constraint)
    }

    /// Append a new version with updated scope and/or severity.
    ///
    /// Non-breaking edits bump the minor version, breaking edits the major.
    /// Retired constraints are immutable.
    #[instrument(skip(self, summary))]
    pub async fn amend(
        &self,
        id: &ConstraintId,
        new_scope: Option<&str>,
        new_severity: Option<Severity>,
        summary: &str,
        breaking: bool,
    ) -> Result<Constraint> {
        let now = self.clock.now();
        let summary_owned = summary.to_string();
        let scope_owned = new_scope.map(str::to_string);
        let constraint = self
            .mutate(id, |c| {
                if c.status == ConstraintStatus::Retired {
                    return Err(RegistryError::Immutable {
                        constraint_id: c.id.to_string(),
                    });
                }
                let version = if breaking {
                    c.current_version().bump_major()
                } else {
                    c.current_version().bump_minor()
                };
                if let Some(scope) = &scope_owned {
                    c.scope = scope.clone();
                }
                if let Some(severity) = new_severity {
                    c.severity = severity;
                }
                c.version_history.push(VersionEntry {
                    version,
                    date: now,
                    change_summary: summary_owned.clone(),
                    breaking,
                });
                c.updated = now;
                Ok(c.clone())
            })
            .await?;

        self.audited(&constraint, "constraint.amend", AuditActor::System)
            .await?;
        Ok(constraint)
    }

    /// Fetch one constraint.
    pub async fn get(&self, id: &ConstraintId) -> Result<Constraint> {
        match fetch::<Constraint>(self.store.as_ref(), &doc_key(id), SCHEMA_VERSION).await? {
            Some(constraint) => Ok(constraint),
            None => Err(RegistryError::NotFound {
                constraint_id: id.to_string(),
            }),
        }
    }

    /// Every constraint, in key order.
    pub async fn all(&self) -> Result<Vec<Constraint>> {
        let mut constraints = Vec::new();
        for key in self.store.keys("constraint/").await? {
            if let Some(c) = fetch::<Constraint>(self.store.as_ref(), &key, SCHEMA_VERSION).await? {
                constraints.push(c);
            }
        }
        Ok(constraints)
    }

    /// The constraints enforcement must consider (Active or Retiring).
    pub async fn enforced(&self) -> Result<Vec<Constraint>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(Constraint::is_enforced)
            .collect())
    }

    /// One validated lifecycle edge under CAS.
    async fn step(
        &self,
        id: &ConstraintId,
        to: ConstraintStatus,
        mut touch: impl FnMut(&mut Constraint),
    ) -> Result<Constraint> {
        let now = self.clock.now();
        self.mutate(id, |c| {
            if !legal_edge(c.status, to) {
                return Err(RegistryError::InvalidTransition {
                    from: c.status,
                    to,
                });
            }
            c.status = to;
            touch(c);
            c.updated = now;
            Ok(c.clone())
        })
        .await
    }

    async fn mutate<R>(
        &self,
        id: &ConstraintId,
        mut apply: impl FnMut(&mut Constraint) -> Result<R>,
    ) -> Result<R> {
        let key = doc_key(id);
        let result = modify::<Constraint, Result<R>, _>(
            self.store.as_ref(),
            self.clock.as_ref(),
            &key,
            SCHEMA_VERSION,
            |prior| {
                let mut c = prior.ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
                let outcome = apply(&mut c);
                Ok((c, outcome))
            },
        )
        .await;
        match result {
            Ok(outcome) => outcome,
            Err(StoreError::NotFound { .. }) => Err(RegistryError::NotFound {
                constraint_id: id.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn audited(
        &self,
        constraint: &Constraint,
        action: &str,
        actor: AuditActor,
    ) -> Result<()> {
        self.audit
            .append(AuditRecord::new(
                self.clock.now(),
                actor,
                action,
                format!("constraint:{}", constraint.id),
                AuditResult::Success,
            ))
            .await?;
        Ok(())
    }
}

/// The four legal lifecycle edges.
fn legal_edge(from: ConstraintStatus, to: ConstraintStatus) -> bool {
    use ConstraintStatus::*;
    matches!(
        (from, to),
        (Draft, Active) | (Active, Retiring) | (Retiring, Active) | (Retiring, Retired)
    )
}
