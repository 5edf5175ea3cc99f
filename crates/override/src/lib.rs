//! Human-approved override grants.
//!
//! When a circuit breaker blocks an action, an agent may request an
//! override. A human confirms out of band by reading back a short challenge
//! token; the approved grant is consumable exactly once. The requesting
//! agent never sees the token, so it cannot approve itself.

pub mod authority;
pub mod channel;
pub mod error;
pub mod grant;
pub mod token;

pub use authority::{ChallengeOutcome, OverrideAuthority, OverrideConfig, SCHEMA_VERSION};
pub use channel::{ApprovalChannel, CapturingChannel, ChallengeDelivery, FailingChannel};
pub use error::{OverrideError, Result};
pub use grant::{OverrideGrant, OverrideState};
pub use token::{generate_token, TOKEN_ALPHABET, TOKEN_LEN};
