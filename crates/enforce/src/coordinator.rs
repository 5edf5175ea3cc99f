//! Enforcement coordinator.
//!
//! The only place the registry, classifier, breaker and override authority
//! compose. The coordinator holds no state of its own; every call is a fresh
//! read of the subsystems.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use warden_audit::{AuditActor, AuditRecord, AuditResult, AuditSink};
use warden_breaker::{BreakerStatus, CircuitBreaker};
use warden_override::{OverrideAuthority, OverrideError};
use warden_registry::{ConstraintRegistry, ConstraintStatus};
use warden_types::{Classifier, Clock, ConstraintId, OverrideId, SessionId, Severity};

use crate::error::Result;

/// Outcome of checking one action against one constraint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum Decision {
    /// The action may proceed. `advisory` carries a warning the agent should
    /// surface (retiring constraint, or an advisory-confidence match).
    Allow { advisory: Option<String> },
    /// The action must not proceed.
    Block {
        constraint_id: ConstraintId,
        severity: Severity,
        reason: String,
        guidance: String,
    },
    /// A human-approved override was consumed to let the action through.
    AllowViaOverride { override_id: OverrideId },
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Block { .. })
    }
}

/// Composes the four subsystems into a single decision point.
pub struct EnforcementCoordinator {
    registry: Arc<ConstraintRegistry>,
    breaker: Arc<CircuitBreaker>,
    overrides: Arc<OverrideAuthority>,
    classifier: Arc<dyn Classifier>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl EnforcementCoordinator {
    pub fn new(
        registry: Arc<ConstraintRegistry>,
        breaker: Arc<CircuitBreaker>,
        overrides: Arc<OverrideAuthority>,
        classifier: Arc<dyn Classifier>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            breaker,
            overrides,
            classifier,
            audit,
            clock,
        }
    }

    /// Decide whether `action` may proceed under one constraint.
    ///
    /// Only a high-confidence match can block. An advisory-confidence match
    /// (0.7 to 0.9) records the violation and allows with an annotation; a
    /// log-only match (below 0.7) allows silently. A retiring constraint
    /// warns instead of blocking, except through an already-open breaker.
    #[instrument(skip(self, action))]
    pub async fn check_action(
        &self,
        constraint_id: &ConstraintId,
        action: &str,
        session: &SessionId,
    ) -> Result<Decision> {
        let constraint = self.registry.get(constraint_id).await?;
        if !constraint.is_enforced() {
            debug!(constraint = %constraint_id, status = %constraint.status, "not enforced");
            return Ok(Decision::Allow { advisory: None });
        }

        let classification = self.classifier.classify(action, &constraint.scope).await?;
        if !classification.matches || classification.is_log_only() {
            debug!(
                constraint = %constraint_id,
                matches = classification.matches,
                confidence = classification.confidence,
                "no enforceable match"
            );
            return Ok(Decision::Allow { advisory: None });
        }

        // An open breaker short-circuits before any new violation is
        // recorded, but only a high-confidence match may be blocked by it.
        if classification.is_high_confidence() {
            if let BreakerStatus::Blocked { cooldown_until, .. } =
                self.breaker.check(constraint_id).await?
            {
                if let Some(grant) = self.overrides.active_for(constraint_id).await? {
                    match self.overrides.consume(&grant.id, action).await {
                        Ok(consumed) => {
                            info!(
                                constraint = %constraint_id,
                                override_id = %consumed.id,
                                "action allowed via override"
                            );
                            self.audited(
                                constraint_id,
                                "enforce.allow_via_override",
                                AuditResult::Success,
                            )
                            .await?;
                            return Ok(Decision::AllowViaOverride {
                                override_id: consumed.id,
                            });
                        }
                        // Lost a race for the grant; fall through to Block.
                        Err(
                            OverrideError::AlreadyUsed { .. }
                            | OverrideError::Expired { .. }
                            | OverrideError::Revoked { .. }
                            | OverrideError::InvalidState { .. },
                        ) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
                let reason = format!(
                    "circuit breaker open: repeated violations of \"{}\"",
                    constraint.scope
                );
                let guidance = format!(
                    "blocked until {cooldown_until}; request a human-approved \
                     override to proceed sooner"
                );
                self.audited(constraint_id, "enforce.block", AuditResult::denied(&reason))
                    .await?;
                return Ok(Decision::Block {
                    constraint_id: constraint_id.clone(),
                    severity: constraint.severity,
                    reason,
                    guidance,
                });
            }
        }

        let outcome = self
            .breaker
            .record_violation(constraint_id, action, session.clone())
            .await?;
        debug!(constraint = %constraint_id, ?outcome, "violation recorded by enforcement");

        if constraint.status == ConstraintStatus::Retiring {
            warn!(constraint = %constraint_id, "violation during sunset, allowing with warning");
            return Ok(Decision::Allow {
                advisory: Some(format!(
                    "constraint {constraint_id} is retiring; this action violates \
                     \"{}\" and would be blocked outside the sunset period",
                    constraint.scope
                )),
            });
        }

        if classification.is_high_confidence() {
            let reason = format!("action violates \"{}\"", constraint.scope);
            let guidance =
                "use a human-approved override, or resolve the underlying issue and retry"
                    .to_string();
            self.audited(constraint_id, "enforce.block", AuditResult::denied(&reason))
                .await?;
            return Ok(Decision::Block {
                constraint_id: constraint_id.clone(),
                severity: constraint.severity,
                reason,
                guidance,
            });
        }

        // Advisory band: recorded above, surfaced here, never blocking.
        Ok(Decision::Allow {
            advisory: Some(format!(
                "action likely violates \"{}\" (confidence {:.2}); recorded as a violation",
                constraint.scope, classification.confidence
            )),
        })
    }

    async fn audited(
        &self,
        constraint_id: &ConstraintId,
        action: &str,
        result: AuditResult,
    ) -> Result<()> {
        self.audit
            .append(AuditRecord::new(
                self.clock.now(),
                AuditActor::System,
                action,
                format!("constraint:{constraint_id}"),
                result,
            ))
            .await?;
        Ok(())
    }
}
