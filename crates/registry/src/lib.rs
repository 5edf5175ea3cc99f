//! Constraint registry.
//!
//! Constraints graduate from accumulated evidence, move through a strict
//! lifecycle (Draft, Active, Retiring, Retired) and carry an append-only
//! version history. The registry also drives the retirement cascade across
//! the breaker and override subsystems.

pub mod error;
pub mod registry;
pub mod types;

pub use error::{RegistryError, Result};
pub use registry::{ConstraintRegistry, SCHEMA_VERSION, SUNSET_DAYS};
pub use types::{Constraint, ConstraintStatus, ConstraintVersion, VersionEntry};
