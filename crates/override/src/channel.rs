//! Out-of-band approval channel.
//!
//! The challenge token travels only through this seam. The requesting agent
//! receives the grant id and nothing else; a human sees the token on
//! whatever surface implements [`ApprovalChannel`] (terminal prompt, chat
//! message, pager). This is a structural boundary, not a convention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use warden_types::{AgentId, ConstraintId, OverrideId};

/// Everything a human needs to decide an override request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeDelivery {
    pub override_id: OverrideId,
    pub constraint_id: ConstraintId,
    pub reason: String,
    pub requested_by: AgentId,
    pub token: String,
    pub respond_by: DateTime<Utc>,
}

/// Surface that puts the challenge in front of a human.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Deliver one challenge. Failure aborts the request; the grant is not
    /// left waiting on a token nobody saw.
    async fn deliver(&self, delivery: ChallengeDelivery) -> Result<(), String>;
}

/// Test channel that records every delivery.
#[derive(Default)]
pub struct CapturingChannel {
    deliveries: Mutex<Vec<ChallengeDelivery>>,
}

impl CapturingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<ChallengeDelivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// The token from the most recent delivery.
    pub fn last_token(&self) -> Option<String> {
        self.deliveries
            .lock()
            .unwrap()
            .last()
            .map(|d| d.token.clone())
    }
}

#[async_trait]
impl ApprovalChannel for CapturingChannel {
    async fn deliver(&self, delivery: ChallengeDelivery) -> Result<(), String> {
        self.deliveries.lock().unwrap().push(delivery);
        Ok(())
    }
}

/// Channel that always fails, for exercising the abort path.
pub struct FailingChannel;

#[async_trait]
impl ApprovalChannel for FailingChannel {
    async fn deliver(&self, _delivery: ChallengeDelivery) -> Result<(), String> {
        Err("channel unavailable".to_string())
    }
}
