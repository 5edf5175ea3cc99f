//! Semantic classifier interface.
//!
//! The engine never performs natural-language understanding itself. Whether
//! an action falls inside a constraint's scope, and whether two failure
//! summaries describe the same problem, are questions answered by an external
//! classifier behind this trait. Production implementations call an LLM;
//! tests use [`TableClassifier`]. Engine logic never branches on which
//! implementation it holds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of effect an action would have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionIntent {
    Destructive,
    Modifying,
    ReadOnly,
    External,
}

/// Result of classifying an action against a scope description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Whether the action falls inside the scope.
    pub matches: bool,
    /// The classifier's reading of the action's effect.
    pub intent: ActionIntent,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

impl Classification {
    /// A non-match with full confidence.
    pub fn no_match() -> Self {
        Self {
            matches: false,
            intent: ActionIntent::ReadOnly,
            confidence: 1.0,
        }
    }

    /// Confidence >= 0.9: eligible for blocking decisions.
    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= 0.9
    }

    /// Confidence in [0.7, 0.9): recorded and surfaced, never blocking.
    pub fn is_advisory(&self) -> bool {
        (0.7..0.9).contains(&self.confidence)
    }

    /// Confidence < 0.7: log-only.
    pub fn is_log_only(&self) -> bool {
        self.confidence < 0.7
    }
}

/// Errors from the external classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The classifier backend was unreachable or failed.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    /// The classifier returned a malformed result.
    #[error("invalid classification: {0}")]
    Invalid(String),
}

/// External semantic classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `action` against the natural-language `scope`.
    async fn classify(&self, action: &str, scope: &str)
        -> Result<Classification, ClassifierError>;
}

/// Rule in a [`TableClassifier`].
#[derive(Debug, Clone)]
struct TableRule {
    action_fragment: String,
    scope_fragment: String,
    classification: Classification,
}

/// Deterministic fixed-table classifier for tests and development.
///
/// Rules match by substring on both the action text and the scope text; the
/// first matching rule wins. Anything unmatched is a confident non-match.
#[derive(Debug, Default)]
pub struct TableClassifier {
    rules: Vec<TableRule>,
}

impl TableClassifier {
    /// Create an empty table (classifies everything as a non-match).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule: actions containing `action_fragment`, checked against
    /// scopes containing `scope_fragment`, yield `classification`.
    pub fn with_rule(
        mut self,
        action_fragment: impl Into<String>,
        scope_fragment: impl Into<String>,
        classification: Classification,
    ) -> Self {
        self.rules.push(TableRule {
            action_fragment: action_fragment.into(),
            scope_fragment: scope_fragment.into(),
            classification,
        });
        self
    }

    /// Convenience: a rule that matches with the given intent and confidence.
    pub fn with_match(
        self,
        action_fragment: impl Into<String>,
        scope_fragment: impl Into<String>,
        intent: ActionIntent,
        confidence: f64,
    ) -> Self {
        self.with_rule(
            action_fragment,
            scope_fragment,
            Classification {
                matches: true,
                intent,
                confidence,
            },
        )
    }
}

#[async_trait]
impl Classifier for TableClassifier {
    async fn classify(
        &self,
        action: &str,
        scope: &str,
    ) -> Result<Classification, ClassifierError> {
        for rule in &self.rules {
            if action.contains(&rule.action_fragment) && scope.contains(&rule.scope_fragment) {
                return Ok(rule.classification.clone());
            }
        }
        Ok(Classification::no_match())
    }
}
