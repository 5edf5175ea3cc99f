//! Enforcement coordinator.
//!
//! Single decision point that composes the constraint registry, the
//! semantic classifier, the circuit breaker and the override authority
//! into an allow/block answer for one proposed action.

pub mod coordinator;
pub mod error;

pub use coordinator::{Decision, EnforcementCoordinator};
pub use error::{EnforceError, Result};
