//! Per-constraint circuit breaker.
//!
//! Violations accumulate in a rolling trailing window; crossing the
//! threshold trips the breaker Open, blocking matching actions until a
//! cooldown and a half-open probation pass. All state lives in the document
//! store, one document per constraint, so any agent process observes the
//! same breaker position.

pub mod breaker;
pub mod config;
pub mod error;
pub mod state;

pub use breaker::{BreakerStatus, CircuitBreaker, SCHEMA_VERSION};
pub use config::BreakerConfig;
pub use error::{BreakerError, Result};
pub use state::{BreakerDoc, BreakerState, ViolationOutcome, ViolationRecord};
