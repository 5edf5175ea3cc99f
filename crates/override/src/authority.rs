//! Override authority service.
//!
//! Grants are one document each under `override/<id>`. Every transition is a
//! CAS read-modify-write, so the exactly-once consume guarantee holds across
//! agent processes without any in-process coordination.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use warden_audit::{AuditActor, AuditRecord, AuditResult, AuditSink};
use warden_store::{fetch, modify, DocumentStore, StoreError};
use warden_types::{AgentId, Clock, ConstraintId, OverrideId};

use crate::channel::{ApprovalChannel, ChallengeDelivery};
use crate::error::{OverrideError, Result};
use crate::grant::{OverrideGrant, OverrideState};
use crate::token::generate_token;

/// Current schema for override documents.
pub const SCHEMA_VERSION: u32 = 1;

fn doc_key(id: &OverrideId) -> String {
    format!("override/{id}")
}

/// Authority tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideConfig {
    /// Minutes a human has to answer the challenge.
    pub challenge_timeout_minutes: i64,
    /// Wrong answers before a forced denial.
    pub max_attempts: u32,
    /// Longest override duration a request may ask for, in hours.
    pub max_duration_hours: i64,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            challenge_timeout_minutes: 5,
            max_attempts: 3,
            max_duration_hours: 24,
        }
    }
}

impl OverrideConfig {
    pub fn challenge_timeout(&self) -> Duration {
        Duration::minutes(self.challenge_timeout_minutes)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::hours(self.max_duration_hours)
    }
}

/// Challenge bookkeeping, persisted alongside the grant but never exposed
/// through any return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Challenge {
    token: String,
    attempts: u32,
    issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OverrideDoc {
    grant: OverrideGrant,
    challenge: Challenge,
}

impl OverrideDoc {
    /// Whether this grant still occupies its constraint's single pending
    /// slot at `now`. Stale documents the sweep has not visited yet do not
    /// block a fresh request.
    fn blocks_new_request(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match self.grant.state {
            OverrideState::Requested => now <= self.challenge.issued_at + timeout,
            OverrideState::Approved | OverrideState::Active => {
                now <= self.grant.expires && !(self.grant.single_use && self.grant.used)
            }
            _ => false,
        }
    }
}

/// What a challenge response produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeOutcome {
    /// Token matched; the grant is now active.
    Approved(OverrideGrant),
    /// Explicit denial, or attempts exhausted.
    Denied,
    /// Wrong token; the challenge stays open.
    AttemptFailed { remaining: u32 },
    /// The response arrived after the challenge window closed.
    TimedOut,
}

/// Human-gated override grants for tripped constraints.
pub struct OverrideAuthority {
    store: Arc<dyn DocumentStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    channel: Arc<dyn ApprovalChannel>,
    config: OverrideConfig,
}

impl OverrideAuthority {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        channel: Arc<dyn ApprovalChannel>,
        config: OverrideConfig,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            channel,
            config,
        }
    }

    /// Open an override request and put the challenge in front of a human.
    ///
    /// The returned grant carries no token; the agent that asked can never
    /// answer its own challenge. One non-terminal override per constraint at
    /// a time.
    #[instrument(skip(self, reason))]
    pub async fn request(
        &self,
        constraint_id: &ConstraintId,
        reason: &str,
        duration: Duration,
        agent: &AgentId,
    ) -> Result<OverrideGrant> {
        if duration <= Duration::zero() {
            return Err(OverrideError::ValidationError(
                "duration must be positive".into(),
            ));
        }
        if duration > self.config.max_duration() {
            return Err(OverrideError::ValidationError(format!(
                "duration exceeds the {}h maximum",
                self.config.max_duration_hours
            )));
        }
        if self.pending_for(constraint_id).await?.is_some() {
            return Err(OverrideError::AlreadyPending {
                constraint_id: constraint_id.to_string(),
            });
        }

        let now = self.clock.now();
        let id = OverrideId::new(Uuid::new_v4().to_string());
        let grant = OverrideGrant {
            id: id.clone(),
            constraint_id: constraint_id.clone(),
            reason: reason.to_string(),
            state: OverrideState::Requested,
            created: now,
            expires: now + duration,
            single_use: true,
            used: false,
            requested_by: agent.clone(),
            decided_by: None,
            decided_at: None,
        };
        let token = { generate_token(&mut rand::thread_rng()) };
        let doc = OverrideDoc {
            grant: grant.clone(),
            challenge: Challenge {
                token: token.clone(),
                attempts: 0,
                issued_at: now,
            },
        };

        let envelope = warden_store::DocumentEnvelope::new(SCHEMA_VERSION, &doc)?;
        self.store.write(&doc_key(&id), envelope, None).await?;

        let delivery = ChallengeDelivery {
            override_id: id.clone(),
            constraint_id: constraint_id.clone(),
            reason: reason.to_string(),
            requested_by: agent.clone(),
            token,
            respond_by: now + self.config.challenge_timeout(),
        };
        if let Err(detail) = self.channel.deliver(delivery).await {
            // Nobody saw the token; close the request rather than leave it
            // waiting for an answer that cannot come.
            warn!(override_id = %id, detail, "challenge delivery failed, closing request");
            self.mutate(&id, |doc| {
                doc.grant.state = OverrideState::Denied;
                doc.grant.decided_at = Some(now);
                Ok(())
            })
            .await?;
            self.audit
                .append(AuditRecord::new(
                    now,
                    AuditActor::Agent(agent.to_string()),
                    "override.request",
                    format!("override:{id}"),
                    AuditResult::failure(format!("challenge delivery failed: {detail}")),
                ))
                .await?;
            return Err(OverrideError::ChannelFailed(detail));
        }

        info!(override_id = %id, constraint = %constraint_id, "override requested");
        self.audit
            .append(AuditRecord::new(
                now,
                AuditActor::Agent(agent.to_string()),
                "override.request",
                format!("override:{id}"),
                AuditResult::Success,
            ))
            .await?;
        Ok(grant)
    }

    /// A human answers the challenge.
    ///
    /// `"deny"` in any casing denies. The token match is exact and
    /// case-sensitive. Each mismatch burns an attempt; exhausting them
    /// forces a denial. A response after the window closes times the
    /// request out regardless of content.
    #[instrument(skip(self, input))]
    pub async fn respond(
        &self,
        override_id: &OverrideId,
        input: &str,
        human: &str,
    ) -> Result<ChallengeOutcome> {
        let timeout = self.config.challenge_timeout();
        let max_attempts = self.config.max_attempts;
        let now = self.clock.now();
        let human_owned = human.to_string();
        let input_owned = input.to_string();

        let outcome = self
            .mutate(override_id, |doc| {
                if doc.grant.state != OverrideState::Requested {
                    return Err(OverrideError::InvalidState {
                        override_id: doc.grant.id.to_string(),
                        state: doc.grant.state,
                    });
                }
                if now > doc.challenge.issued_at + timeout {
                    doc.grant.state = OverrideState::Timeout;
                    doc.grant.decided_at = Some(now);
                    return Ok(ChallengeOutcome::TimedOut);
                }
                if input_owned.eq_ignore_ascii_case("deny") {
                    doc.grant.state = OverrideState::Denied;
                    doc.grant.decided_by = Some(human_owned.clone());
                    doc.grant.decided_at = Some(now);
                    return Ok(ChallengeOutcome::Denied);
                }
                if input_owned == doc.challenge.token {
                    // Approved and immediately active in the same write.
                    doc.grant.state = OverrideState::Active;
                    doc.grant.decided_by = Some(human_owned.clone());
                    doc.grant.decided_at = Some(now);
                    return Ok(ChallengeOutcome::Approved(doc.grant.clone()));
                }
                doc.challenge.attempts += 1;
                if doc.challenge.attempts >= max_attempts {
                    doc.grant.state = OverrideState::Denied;
                    doc.grant.decided_by = Some(human_owned.clone());
                    doc.grant.decided_at = Some(now);
                    Ok(ChallengeOutcome::Denied)
                } else {
                    Ok(ChallengeOutcome::AttemptFailed {
                        remaining: max_attempts - doc.challenge.attempts,
                    })
                }
            })
            .await?;

        let resource = format!("override:{override_id}");
        match &outcome {
            ChallengeOutcome::Approved(_) => {
                self.audit
                    .append(AuditRecord::new(
                        now,
                        AuditActor::Human(human.to_string()),
                        "override.approve",
                        resource,
                        AuditResult::Success,
                    ))
                    .await?;
            }
            ChallengeOutcome::Denied => {
                self.audit
                    .append(AuditRecord::new(
                        now,
                        AuditActor::Human(human.to_string()),
                        "override.deny",
                        resource,
                        AuditResult::denied("challenge denied"),
                    ))
                    .await?;
            }
            ChallengeOutcome::TimedOut => {
                self.audit
                    .append(AuditRecord::new(
                        now,
                        AuditActor::Human(human.to_string()),
                        "override.timeout",
                        resource,
                        AuditResult::denied("challenge window closed"),
                    ))
                    .await?;
            }
            ChallengeOutcome::AttemptFailed { remaining } => {
                warn!(override_id = %override_id, remaining, "challenge attempt failed");
            }
        }
        Ok(outcome)
    }

    /// Consume an active grant for one action. Exactly-once: under
    /// concurrent calls one caller gets the grant and the rest get
    /// `AlreadyUsed`.
    #[instrument(skip(self, action))]
    pub async fn consume(&self, override_id: &OverrideId, action: &str) -> Result<OverrideGrant> {
        let now = self.clock.now();
        let grant = self
            .mutate(override_id, |doc| match doc.grant.state {
                OverrideState::Active => {
                    if now > doc.grant.expires {
                        doc.grant.state = OverrideState::Expired;
                        return Err(OverrideError::Expired {
                            override_id: doc.grant.id.to_string(),
                        });
                    }
                    doc.grant.used = true;
                    if doc.grant.single_use {
                        doc.grant.state = OverrideState::Used;
                    }
                    Ok(doc.grant.clone())
                }
                OverrideState::Used => Err(OverrideError::AlreadyUsed {
                    override_id: doc.grant.id.to_string(),
                }),
                OverrideState::Expired => Err(OverrideError::Expired {
                    override_id: doc.grant.id.to_string(),
                }),
                OverrideState::Revoked => Err(OverrideError::Revoked {
                    override_id: doc.grant.id.to_string(),
                }),
                state => Err(OverrideError::InvalidState {
                    override_id: doc.grant.id.to_string(),
                    state,
                }),
            })
            .await?;

        info!(override_id = %override_id, action, "override consumed");
        self.audit
            .append(AuditRecord::new(
                now,
                AuditActor::Agent(grant.requested_by.to_string()),
                "override.consume",
                format!("override:{override_id}"),
                AuditResult::Success,
            ))
            .await?;
        Ok(grant)
    }

    /// Revoke an unused, non-terminal grant.
    #[instrument(skip(self))]
    pub async fn revoke(&self, override_id: &OverrideId, human: &str) -> Result<OverrideGrant> {
        let now = self.clock.now();
        let human_owned = human.to_string();
        let grant = self
            .mutate(override_id, |doc| {
                if doc.grant.state.is_terminal() || doc.grant.used {
                    return Err(OverrideError::InvalidState {
                        override_id: doc.grant.id.to_string(),
                        state: doc.grant.state,
                    });
                }
                doc.grant.state = OverrideState::Revoked;
                doc.grant.decided_by = Some(human_owned.clone());
                doc.grant.decided_at = Some(now);
                Ok(doc.grant.clone())
            })
            .await?;

        self.audit
            .append(AuditRecord::new(
                now,
                AuditActor::Human(human.to_string()),
                "override.revoke",
                format!("override:{override_id}"),
                AuditResult::Success,
            ))
            .await?;
        Ok(grant)
    }

    /// Sweep every grant past its deadline into its terminal state.
    ///
    /// Requested past the challenge window goes to Timeout; Approved or
    /// Active past its expiry goes to Expired. Returns the ids that moved.
    #[instrument(skip(self))]
    pub async fn expire_pending(&self) -> Result<Vec<OverrideId>> {
        let timeout = self.config.challenge_timeout();
        let mut moved = Vec::new();
        for key in self.store.keys("override/").await? {
            let Some(doc) = fetch::<OverrideDoc>(self.store.as_ref(), &key, SCHEMA_VERSION).await?
            else {
                continue;
            };
            let now = self.clock.now();
            let target = match doc.grant.state {
                OverrideState::Requested if now > doc.challenge.issued_at + timeout => {
                    Some(OverrideState::Timeout)
                }
                OverrideState::Approved | OverrideState::Active if now > doc.grant.expires => {
                    Some(OverrideState::Expired)
                }
                _ => None,
            };
            let Some(target) = target else { continue };

            let id = doc.grant.id.clone();
            let result = self
                .mutate(&id, |doc| {
                    // Re-check under CAS; a racing respond or consume wins.
                    if doc.grant.state.is_terminal() {
                        return Err(OverrideError::InvalidState {
                            override_id: doc.grant.id.to_string(),
                            state: doc.grant.state,
                        });
                    }
                    doc.grant.state = target;
                    doc.grant.decided_at = Some(now);
                    Ok(())
                })
                .await;
            match result {
                Ok(()) => {
                    let action = match target {
                        OverrideState::Timeout => "override.timeout",
                        _ => "override.expire",
                    };
                    self.audit
                        .append(AuditRecord::new(
                            now,
                            AuditActor::System,
                            action,
                            format!("override:{id}"),
                            AuditResult::Success,
                        ))
                        .await?;
                    moved.push(id);
                }
                Err(OverrideError::InvalidState { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(moved)
    }

    /// Expire every non-terminal grant for a constraint. Retirement cascade
    /// hook; a constraint that no longer exists cannot be overridden.
    #[instrument(skip(self))]
    pub async fn expire_for_constraint(&self, constraint_id: &ConstraintId) -> Result<u32> {
        let mut expired = 0;
        for key in self.store.keys("override/").await? {
            let Some(doc) = fetch::<OverrideDoc>(self.store.as_ref(), &key, SCHEMA_VERSION).await?
            else {
                continue;
            };
            if doc.grant.constraint_id != *constraint_id || doc.grant.state.is_terminal() {
                continue;
            }
            let now = self.clock.now();
            let id = doc.grant.id.clone();
            let result = self
                .mutate(&id, |doc| {
                    if doc.grant.state.is_terminal() {
                        return Err(OverrideError::InvalidState {
                            override_id: doc.grant.id.to_string(),
                            state: doc.grant.state,
                        });
                    }
                    doc.grant.state = OverrideState::Expired;
                    doc.grant.decided_at = Some(now);
                    Ok(())
                })
                .await;
            match result {
                Ok(()) => {
                    self.audit
                        .append(AuditRecord::new(
                            now,
                            AuditActor::System,
                            "override.expire",
                            format!("override:{id}"),
                            AuditResult::Success,
                        ))
                        .await?;
                    expired += 1;
                }
                Err(OverrideError::InvalidState { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(expired)
    }

    /// The grant as callers may see it.
    pub async fn get(&self, override_id: &OverrideId) -> Result<OverrideGrant> {
        match fetch::<OverrideDoc>(self.store.as_ref(), &doc_key(override_id), SCHEMA_VERSION)
            .await?
        {
            Some(doc) => Ok(doc.grant),
            None => Err(OverrideError::NotFound {
                override_id: override_id.to_string(),
            }),
        }
    }

    /// The consumable grant for a constraint, if one exists right now.
    pub async fn active_for(&self, constraint_id: &ConstraintId) -> Result<Option<OverrideGrant>> {
        let now = self.clock.now();
        for key in self.store.keys("override/").await? {
            if let Some(doc) =
                fetch::<OverrideDoc>(self.store.as_ref(), &key, SCHEMA_VERSION).await?
            {
                if doc.grant.constraint_id == *constraint_id && doc.grant.is_consumable(now) {
                    return Ok(Some(doc.grant));
                }
            }
        }
        Ok(None)
    }

    /// The grant currently occupying a constraint's pending slot.
    async fn pending_for(&self, constraint_id: &ConstraintId) -> Result<Option<OverrideGrant>> {
        let now = self.clock.now();
        let timeout = self.config.challenge_timeout();
        for key in self.store.keys("override/").await? {
            if let Some(doc) =
                fetch::<OverrideDoc>(self.store.as_ref(), &key, SCHEMA_VERSION).await?
            {
                if doc.grant.constraint_id == *constraint_id && doc.blocks_new_request(now, timeout)
                {
                    return Ok(Some(doc.grant));
                }
            }
        }
        Ok(None)
    }

    /// CAS transition of one grant document. The mutated document is
    /// persisted even when the closure reports a domain error (lazy expiry
    /// relies on that); on a version conflict the closure reruns against the
    /// fresh document.
    async fn mutate<R>(
        &self,
        override_id: &OverrideId,
        mut apply: impl FnMut(&mut OverrideDoc) -> Result<R>,
    ) -> Result<R> {
        let key = doc_key(override_id);
        let result = modify::<OverrideDoc, Result<R>, _>(
            self.store.as_ref(),
            self.clock.as_ref(),
            &key,
            SCHEMA_VERSION,
            |prior| {
                let mut doc = prior.ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
                let outcome = apply(&mut doc);
                Ok((doc, outcome))
            },
        )
        .await;
        match result {
            Ok(outcome) => outcome,
            Err(StoreError::NotFound { .. }) => Err(OverrideError::NotFound {
                override_id: override_id.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

}
