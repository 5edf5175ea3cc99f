//! Shared contracts for the Warden constraint governance engine.
//!
//! This crate holds the types every other Warden crate agrees on: newtype
//! identifiers, the severity scale, the clock abstraction that makes timing
//! rules testable, and the semantic classifier interface that the engine
//! consumes but never implements.

pub mod classifier;
pub mod clock;
pub mod id;
pub mod severity;

pub use classifier::{ActionIntent, Classification, Classifier, ClassifierError, TableClassifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use id::{AgentId, ConstraintId, ObservationSlug, OverrideId, SessionId};
pub use severity::Severity;
