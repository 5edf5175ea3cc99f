//! Breaker configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{BreakerError, Result};

/// Per-constraint breaker tuning. Every field is overridable per constraint;
/// the defaults are the engine-wide policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// In-window violations required to trip.
    pub violation_threshold: u32,
    /// Rolling window length in days (trailing, not calendar-aligned).
    pub window_days: i64,
    /// Hours an Open breaker waits before probation.
    pub cooldown_hours: i64,
    /// Seconds within which a repeated identical action collapses into the
    /// previous violation.
    pub dedup_seconds: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            violation_threshold: 5,
            window_days: 30,
            cooldown_hours: 24,
            dedup_seconds: 300,
        }
    }
}

impl BreakerConfig {
    /// Reject non-positive values.
    pub fn validate(&self) -> Result<()> {
        if self.violation_threshold == 0 {
            return Err(BreakerError::InvalidConfig(
                "violation_threshold must be positive".into(),
            ));
        }
        if self.window_days <= 0 {
            return Err(BreakerError::InvalidConfig(
                "window_days must be positive".into(),
            ));
        }
        if self.cooldown_hours <= 0 {
            return Err(BreakerError::InvalidConfig(
                "cooldown_hours must be positive".into(),
            ));
        }
        if self.dedup_seconds <= 0 {
            return Err(BreakerError::InvalidConfig(
                "dedup_seconds must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::days(self.window_days)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::hours(self.cooldown_hours)
    }

    pub fn dedup(&self) -> Duration {
        Duration::seconds(self.dedup_seconds)
    }
}
