//! Breaker state machine.
//!
//! The persisted document keeps the raw state plus the full violation
//! history; the *effective* state is recomputed against the clock on every
//! read because both the rolling window and the cooldown slide continuously.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_types::{ConstraintId, SessionId};

use crate::config::BreakerConfig;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation; violations accumulate toward the threshold.
    Closed,
    /// Tripped; matching actions are blocked until the cooldown elapses.
    Open,
    /// Probation after cooldown; one violation re-trips.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// One recorded violation. Retained forever for history and audit; only the
/// in-window subset counts toward trip decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub session: SessionId,
}

/// Outcome of recording one violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationOutcome {
    /// Collapsed into the previous violation (identical action text within
    /// the dedup interval).
    Deduplicated,
    /// Counted without changing the breaker position.
    Recorded { in_window: u32 },
    /// Counted and tripped (or re-tripped from probation) to Open.
    Tripped { in_window: u32 },
}

/// Persisted per-constraint breaker document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerDoc {
    pub constraint_id: ConstraintId,
    pub state: BreakerState,
    pub violations: Vec<ViolationRecord>,
    pub last_trip: Option<DateTime<Utc>>,
    pub last_reset: Option<DateTime<Utc>>,
    pub trip_count: u32,
    pub config: BreakerConfig,
    pub created: DateTime<Utc>,
}

impl BreakerDoc {
    /// Fresh Closed breaker.
    pub fn new(constraint_id: ConstraintId, config: BreakerConfig, now: DateTime<Utc>) -> Self {
        Self {
            constraint_id,
            state: BreakerState::Closed,
            violations: Vec::new(),
            last_trip: None,
            last_reset: None,
            trip_count: 0,
            config,
            created: now,
        }
    }

    /// When the current Open period's cooldown ends.
    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.last_trip.map(|t| t + self.config.cooldown())
    }

    /// When probation ends if no violation arrives. Probation reuses the
    /// cooldown length.
    fn probation_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until().map(|t| t + self.config.cooldown())
    }

    /// The state an observer sees at `now`, with cooldown and probation
    /// applied lazily.
    pub fn effective_state(&self, now: DateTime<Utc>) -> BreakerState {
        match self.state {
            BreakerState::Closed => BreakerState::Closed,
            BreakerState::Open | BreakerState::HalfOpen => {
                match (self.cooldown_until(), self.probation_until()) {
                    (Some(cooldown_end), Some(probation_end)) => {
                        if now >= probation_end {
                            BreakerState::Closed
                        } else if now >= cooldown_end {
                            BreakerState::HalfOpen
                        } else {
                            BreakerState::Open
                        }
                    }
                    // Open without a trip timestamp cannot happen through
                    // this API; treat as still Open.
                    _ => self.state,
                }
            }
        }
    }

    /// Persist any lazy transition that `now` implies, so subsequent
    /// mutations run against the real position.
    fn normalize(&mut self, now: DateTime<Utc>) {
        let effective = self.effective_state(now);
        if effective == BreakerState::Closed && self.state != BreakerState::Closed {
            // Probation completed without a violation: the window resets at
            // the instant probation ended.
            self.last_reset = self.probation_until().max(self.last_reset);
            self.state = BreakerState::Closed;
        } else {
            self.state = effective;
        }
    }

    /// Violations that count toward trip decisions at `now`: inside the
    /// trailing window and after the most recent reset.
    pub fn counted_violations(&self, now: DateTime<Utc>) -> u32 {
        let window_start = now - self.config.window();
        self.violations
            .iter()
            .filter(|v| {
                v.timestamp >= window_start
                    && v.timestamp <= now
                    && self.last_reset.map_or(true, |r| v.timestamp > r)
            })
            .count() as u32
    }

    /// Record one violation, applying dedup, window counting and trip
    /// evaluation in a single step.
    pub fn apply_violation(
        &mut self,
        action: &str,
        session: SessionId,
        now: DateTime<Utc>,
    ) -> ViolationOutcome {
        // Dedup compares against the most recent violation only, not the
        // whole window: read-think-retry of the same action is one mistake.
        if let Some(last) = self.violations.last() {
            if last.action == action && now - last.timestamp <= self.config.dedup() {
                return ViolationOutcome::Deduplicated;
            }
        }

        self.normalize(now);
        self.violations.push(ViolationRecord {
            timestamp: now,
            action: action.to_string(),
            session,
        });

        match self.state {
            BreakerState::HalfOpen => {
                // Any violation during probation re-trips and also lands in
                // the window (documented double-count, preserved as-is).
                self.trip(now);
                ViolationOutcome::Tripped {
                    in_window: self.counted_violations(now),
                }
            }
            BreakerState::Closed => {
                let in_window = self.counted_violations(now);
                if in_window >= self.config.violation_threshold {
                    self.trip(now);
                    ViolationOutcome::Tripped { in_window }
                } else {
                    ViolationOutcome::Recorded { in_window }
                }
            }
            BreakerState::Open => ViolationOutcome::Recorded {
                in_window: self.counted_violations(now),
            },
        }
    }

    /// Manual reset from any state. History is retained; the counted window
    /// restarts at `now`.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.state = BreakerState::Closed;
        self.last_reset = Some(now);
    }

    fn trip(&mut self, now: DateTime<Utc>) {
        self.state = BreakerState::Open;
        self.last_trip = Some(now);
        self.trip_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn doc() -> BreakerDoc {
        BreakerDoc::new(ConstraintId::new("c-1"), BreakerConfig::default(), t0())
    }

    fn violate(doc: &mut BreakerDoc, action: &str, at: DateTime<Utc>) -> ViolationOutcome {
        doc.apply_violation(action, SessionId::new("s"), at)
    }

    #[test]
    fn trips_on_exactly_the_threshold_violation() {
        let mut doc = doc();
        let mut at = t0();
        for i in 1..=4u32 {
            at += Duration::hours(1);
            let outcome = violate(&mut doc, &format!("action {i}"), at);
            assert_eq!(outcome, ViolationOutcome::Recorded { in_window: i });
        }
        at += Duration::hours(1);
        let outcome = violate(&mut doc, "action 5", at);
        assert_eq!(outcome, ViolationOutcome::Tripped { in_window: 5 });
        assert_eq!(doc.effective_state(at), BreakerState::Open);
        assert_eq!(doc.trip_count, 1);
    }

    #[test]
    fn violations_outside_window_do_not_count() {
        let mut doc = doc();
        // Four violations long ago, one recent: never trips.
        for i in 0..4 {
            violate(&mut doc, &format!("old {i}"), t0() + Duration::hours(i));
        }
        let later = t0() + Duration::days(31);
        let outcome = violate(&mut doc, "recent", later);
        assert_eq!(outcome, ViolationOutcome::Recorded { in_window: 1 });
        // History retained for audit.
        assert_eq!(doc.violations.len(), 5);
    }

    #[test]
    fn dedup_collapses_identical_action_within_interval() {
        let mut doc = doc();
        violate(&mut doc, "git push -f", t0());
        let outcome = violate(&mut doc, "git push -f", t0() + Duration::seconds(100));
        assert_eq!(outcome, ViolationOutcome::Deduplicated);
        assert_eq!(doc.violations.len(), 1);
    }

    #[test]
    fn dedup_boundary_at_exact_interval() {
        let mut doc = doc();
        violate(&mut doc, "git push -f", t0());
        // Exactly dedup_seconds apart still collapses...
        let at_boundary = violate(&mut doc, "git push -f", t0() + Duration::seconds(300));
        assert_eq!(at_boundary, ViolationOutcome::Deduplicated);
        // ...one second past it counts.
        let past = violate(&mut doc, "git push -f", t0() + Duration::seconds(301));
        assert_eq!(past, ViolationOutcome::Recorded { in_window: 2 });
    }

    #[test]
    fn different_action_text_never_dedups() {
        let mut doc = doc();
        violate(&mut doc, "git push -f", t0());
        let outcome = violate(&mut doc, "git push --force", t0() + Duration::seconds(10));
        assert_eq!(outcome, ViolationOutcome::Recorded { in_window: 2 });
    }

    #[test]
    fn cooldown_moves_open_to_half_open() {
        let mut doc = doc();
        let mut at = t0();
        for i in 0..5 {
            at += Duration::hours(1);
            violate(&mut doc, &format!("a{i}"), at);
        }
        assert_eq!(doc.effective_state(at), BreakerState::Open);
        assert_eq!(
            doc.effective_state(at + Duration::hours(23)),
            BreakerState::Open
        );
        assert_eq!(
            doc.effective_state(at + Duration::hours(24)),
            BreakerState::HalfOpen
        );
    }

    #[test]
    fn half_open_violation_retrips_and_resets_cooldown() {
        let mut doc = doc();
        let mut at = t0();
        for i in 0..5 {
            at += Duration::hours(1);
            violate(&mut doc, &format!("a{i}"), at);
        }
        let tripped_at = at;
        let probe_at = tripped_at + Duration::hours(25);
        assert_eq!(doc.effective_state(probe_at), BreakerState::HalfOpen);

        let outcome = violate(&mut doc, "probe", probe_at);
        assert!(matches!(outcome, ViolationOutcome::Tripped { .. }));
        assert_eq!(doc.trip_count, 2);
        // Cooldown restarts from the probation violation.
        assert_eq!(doc.cooldown_until(), Some(probe_at + Duration::hours(24)));
    }

    #[test]
    fn half_open_violation_double_counts_in_window() {
        let mut doc = doc();
        let mut at = t0();
        for i in 0..5 {
            at += Duration::hours(1);
            violate(&mut doc, &format!("a{i}"), at);
        }
        let probe_at = at + Duration::hours(25);
        let outcome = violate(&mut doc, "probe", probe_at);
        // The probation violation both re-trips and lands in the counted
        // window alongside the five that caused the original trip.
        assert_eq!(outcome, ViolationOutcome::Tripped { in_window: 6 });
    }

    #[test]
    fn quiet_probation_closes_and_resets_window() {
        let mut doc = doc();
        let mut at = t0();
        for i in 0..5 {
            at += Duration::hours(1);
            violate(&mut doc, &format!("a{i}"), at);
        }
        // Cooldown (24h) plus a full quiet probation (24h).
        let after = at + Duration::hours(49);
        assert_eq!(doc.effective_state(after), BreakerState::Closed);

        // Window restarted: the old five violations no longer count.
        let outcome = violate(&mut doc, "fresh", after);
        assert_eq!(outcome, ViolationOutcome::Recorded { in_window: 1 });
        assert_eq!(doc.state, BreakerState::Closed);
    }

    #[test]
    fn manual_reset_clears_counted_window_keeps_history() {
        let mut doc = doc();
        let mut at = t0();
        for i in 0..5 {
            at += Duration::hours(1);
            violate(&mut doc, &format!("a{i}"), at);
        }
        assert_eq!(doc.effective_state(at), BreakerState::Open);

        doc.reset(at + Duration::hours(1));
        assert_eq!(doc.effective_state(at + Duration::hours(1)), BreakerState::Closed);
        assert_eq!(doc.counted_violations(at + Duration::hours(2)), 0);
        assert_eq!(doc.violations.len(), 5);
    }

    #[test]
    fn open_breaker_records_without_second_trip() {
        let mut doc = doc();
        let mut at = t0();
        for i in 0..5 {
            at += Duration::hours(1);
            violate(&mut doc, &format!("a{i}"), at);
        }
        assert_eq!(doc.trip_count, 1);
        let outcome = violate(&mut doc, "while open", at + Duration::hours(2));
        assert!(matches!(outcome, ViolationOutcome::Recorded { .. }));
        assert_eq!(doc.trip_count, 1);
    }

    #[test]
    fn serde_roundtrip() {
        let mut doc = doc();
        violate(&mut doc, "a", t0() + Duration::hours(1));
        let json = serde_json::to_string(&doc).unwrap();
        let restored: BreakerDoc = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, doc);
    }
}
