//! Evidence ledger service.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use warden_audit::{AuditActor, AuditRecord, AuditResult, AuditSink};
use warden_store::{fetch, modify, DocumentStore};
use warden_types::{Classifier, Clock, ObservationSlug};

use crate::eligibility::EligibilityReport;
use crate::error::{EvidenceError, Result};
use crate::observation::{Observation, ObservationKind, SourceRef};

/// Store key holding the observation set.
pub const OBSERVATIONS_KEY: &str = "observations";
/// Current schema for the observation set document.
pub const SCHEMA_VERSION: u32 = 1;

/// All observations, keyed by slug. One persisted document.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ObservationSet {
    pub observations: BTreeMap<String, Observation>,
}

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct EvidenceConfig {
    /// Minimum classifier confidence for a similarity match on `record`.
    pub similarity_threshold: f64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
        }
    }
}

/// Tracks observations and computes constraint-generation eligibility.
pub struct EvidenceLedger {
    store: Arc<dyn DocumentStore>,
    classifier: Arc<dyn Classifier>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: EvidenceConfig,
}

impl EvidenceLedger {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        classifier: Arc<dyn Classifier>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: EvidenceConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            audit,
            clock,
            config,
        }
    }

    /// Record a failure (or pattern) signal.
    ///
    /// The first occurrence creates an observation; later occurrences match
    /// by exact slug, then by classifier similarity against existing
    /// summaries of the same kind. A match increments `r_count` and appends
    /// the source; anything below the similarity threshold becomes a new
    /// observation.
    #[instrument(skip(self, source))]
    pub async fn record(
        &self,
        kind: ObservationKind,
        summary: &str,
        source: SourceRef,
    ) -> Result<Observation> {
        let target = self.resolve_slug(kind, summary).await?;
        debug!(slug = %target, "recording observation occurrence");

        let now = self.clock.now();
        let kind_copy = kind;
        let summary_owned = summary.to_string();
        let observation = modify::<ObservationSet, Observation, _>(
            self.store.as_ref(),
            self.clock.as_ref(),
            OBSERVATIONS_KEY,
            SCHEMA_VERSION,
            |prior| {
                let mut set = prior.unwrap_or_default();
                let obs = match set.observations.get_mut(target.as_str()) {
                    Some(existing) => {
                        existing.r_count += 1;
                        existing.sources.push(source.clone());
                        existing.updated = now;
                        existing.clone()
                    }
                    None => {
                        let fresh =
                            Observation::first(kind_copy, summary_owned.clone(), source.clone(), now);
                        set.observations
                            .insert(fresh.slug.to_string(), fresh.clone());
                        fresh
                    }
                };
                Ok((set, obs))
            },
        )
        .await?;

        self.audit
            .append(AuditRecord::new(
                now,
                AuditActor::Agent(source_session(&observation)),
                "observation.record",
                format!("observation:{}", observation.slug),
                AuditResult::Success,
            ))
            .await?;
        Ok(observation)
    }

    /// Human confirmation that the observed failure is real.
    ///
    /// A repeat confirmation by the same user is a no-op warning, not an
    /// error. Unknown slugs are `NotFound`, never silently created.
    #[instrument(skip(self))]
    pub async fn confirm(&self, slug: &ObservationSlug, user: &str) -> Result<Observation> {
        self.attest(slug, user, true).await
    }

    /// Human disconfirmation. Same dedup and not-found rules as `confirm`.
    #[instrument(skip(self))]
    pub async fn disconfirm(&self, slug: &ObservationSlug, user: &str) -> Result<Observation> {
        self.attest(slug, user, false).await
    }

    /// Fetch a single observation.
    pub async fn get(&self, slug: &ObservationSlug) -> Result<Observation> {
        let set = self.load().await?;
        set.observations
            .get(slug.as_str())
            .cloned()
            .ok_or_else(|| EvidenceError::NotFound {
                slug: slug.to_string(),
            })
    }

    /// All observations, slug-ordered. Read-only snapshot.
    pub async fn all(&self) -> Result<Vec<Observation>> {
        Ok(self.load().await?.observations.into_values().collect())
    }

    /// Evaluate the five-condition eligibility report for a slug.
    pub async fn eligibility(&self, slug: &ObservationSlug) -> Result<EligibilityReport> {
        Ok(EligibilityReport::evaluate(&self.get(slug).await?))
    }

    async fn load(&self) -> Result<ObservationSet> {
        Ok(
            fetch::<ObservationSet>(self.store.as_ref(), OBSERVATIONS_KEY, SCHEMA_VERSION)
                .await?
                .unwrap_or_default(),
        )
    }

    /// Pick the slug an incoming summary belongs to: exact slug first, then
    /// the highest-confidence similarity match of the same kind.
    async fn resolve_slug(
        &self,
        kind: ObservationKind,
        summary: &str,
    ) -> Result<ObservationSlug> {
        let exact = ObservationSlug::derive(summary);
        let set = self.load().await?;
        if set.observations.contains_key(exact.as_str()) {
            return Ok(exact);
        }

        let mut best: Option<(f64, ObservationSlug)> = None;
        for obs in set.observations.values().filter(|o| o.kind == kind) {
            let c = self.classifier.classify(summary, &obs.summary).await?;
            if c.matches
                && c.confidence >= self.config.similarity_threshold
                && best.as_ref().map_or(true, |(b, _)| c.confidence > *b)
            {
                best = Some((c.confidence, obs.slug.clone()));
            }
        }
        Ok(best.map(|(_, slug)| slug).unwrap_or(exact))
    }

    async fn attest(
        &self,
        slug: &ObservationSlug,
        user: &str,
        confirming: bool,
    ) -> Result<Observation> {
        // Observations are never deleted, so an existence check before the
        // CAS write cannot race with a removal.
        let set = self.load().await?;
        if !set.observations.contains_key(slug.as_str()) {
            return Err(EvidenceError::NotFound {
                slug: slug.to_string(),
            });
        }

        let now = self.clock.now();
        let slug_key = slug.to_string();
        let user_owned = user.to_string();
        let outcome = modify::<ObservationSet, Option<(Observation, bool)>, _>(
            self.store.as_ref(),
            self.clock.as_ref(),
            OBSERVATIONS_KEY,
            SCHEMA_VERSION,
            |prior| {
                let mut set = prior.unwrap_or_default();
                let result = set.observations.get_mut(&slug_key).map(|obs| {
                    let seen = if confirming {
                        obs.confirmers.contains(&user_owned)
                    } else {
                        obs.disconfirmers.contains(&user_owned)
                    };
                    if seen {
                        (obs.clone(), false)
                    } else {
                        if confirming {
                            obs.c_count += 1;
                            obs.confirmers.insert(user_owned.clone());
                        } else {
                            obs.d_count += 1;
                            obs.disconfirmers.insert(user_owned.clone());
                        }
                        obs.updated = now;
                        (obs.clone(), true)
                    }
                });
                Ok((set, result))
            },
        )
        .await?;

        let action = if confirming {
            "observation.confirm"
        } else {
            "observation.disconfirm"
        };
        match outcome {
            None => Err(EvidenceError::NotFound {
                slug: slug.to_string(),
            }),
            Some((obs, false)) => {
                warn!(slug = %slug, user, "repeat attestation ignored");
                Ok(obs)
            }
            Some((obs, true)) => {
                self.audit
                    .append(AuditRecord::new(
                        now,
                        AuditActor::Human(user.to_string()),
                        action,
                        format!("observation:{slug}"),
                        AuditResult::Success,
                    ))
                    .await?;
                Ok(obs)
            }
        }
    }
}

fn source_session(observation: &Observation) -> String {
    observation
        .sources
        .last()
        .map(|s| s.session.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
