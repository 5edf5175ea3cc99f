//! Observation model.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_types::{ObservationSlug, SessionId};

/// What kind of evidence an observation accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    /// A human-verified failure. Only these can graduate into constraints.
    Failure,
    /// A behavioral pattern worth tracking. Permanently ineligible for
    /// constraint generation regardless of counters.
    Pattern,
}

/// Where a recurrence was seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub file: String,
    pub date: DateTime<Utc>,
    pub session: SessionId,
}

/// An accumulating evidence record for a candidate rule.
///
/// Observations are created on the first failure signal, mutated by
/// recurrence matches and human confirm/disconfirm, and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub slug: ObservationSlug,
    pub kind: ObservationKind,
    /// The free-text failure summary the slug was derived from; also the
    /// text the similarity classifier matches new reports against.
    pub summary: String,
    /// Recurrence count.
    pub r_count: u32,
    /// Confirmation count.
    pub c_count: u32,
    /// Disconfirmation count.
    pub d_count: u32,
    /// Distinct users who confirmed. BTreeSet for stable serialization.
    #[serde(default)]
    pub confirmers: BTreeSet<String>,
    /// Distinct users who disconfirmed.
    #[serde(default)]
    pub disconfirmers: BTreeSet<String>,
    pub sources: Vec<SourceRef>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Observation {
    /// Create a fresh observation from its first source.
    pub fn first(
        kind: ObservationKind,
        summary: impl Into<String>,
        source: SourceRef,
        now: DateTime<Utc>,
    ) -> Self {
        let summary = summary.into();
        Self {
            slug: ObservationSlug::derive(&summary),
            kind,
            summary,
            r_count: 1,
            c_count: 0,
            d_count: 0,
            confirmers: BTreeSet::new(),
            disconfirmers: BTreeSet::new(),
            sources: vec![source],
            created: now,
            updated: now,
        }
    }

    /// Number of distinct files across all sources.
    pub fn distinct_source_files(&self) -> usize {
        self.sources
            .iter()
            .map(|s| s.file.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Number of distinct confirming users.
    pub fn unique_confirmers(&self) -> usize {
        self.confirmers.len()
    }
}
