//! Override grant lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_types::{AgentId, ConstraintId, OverrideId};

/// Lifecycle of an override grant.
///
/// `Requested`, `Approved` and `Active` are non-terminal; everything else is
/// final. `Approved` is transient: a correct challenge response moves the
/// grant through `Approved` straight to `Active` in the same write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideState {
    Requested,
    Approved,
    Active,
    Used,
    Expired,
    Revoked,
    Denied,
    Timeout,
}

impl OverrideState {
    /// Whether the grant can still change state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Requested | Self::Approved | Self::Active)
    }
}

impl std::fmt::Display for OverrideState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::Approved => "approved",
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Denied => "denied",
            Self::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// One override grant. This is the view callers receive; the challenge
/// token is persisted separately and never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideGrant {
    pub id: OverrideId,
    pub constraint_id: ConstraintId,
    pub reason: String,
    pub state: OverrideState,
    pub created: DateTime<Utc>,
    /// When an approved grant stops being usable.
    pub expires: DateTime<Utc>,
    pub single_use: bool,
    pub used: bool,
    pub requested_by: AgentId,
    /// The human who approved, denied or revoked the grant.
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl OverrideGrant {
    /// Whether the grant is currently consumable at `now`.
    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        self.state == OverrideState::Active && !self.used && now <= self.expires
    }
}
