//! Intent classification: decides which handler owns a request.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::prompts::CLASSIFY_SYSTEM;
use crate::llm::{complete_json, CompletionRequest, LlmError, LlmProvider};

/// Coarse category of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Knowledge,
    Workflow,
    Escalation,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Knowledge => "knowledge",
            Intent::Workflow => "workflow",
            Intent::Escalation => "escalation",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "knowledge" => Ok(Intent::Knowledge),
            "workflow" => Ok(Intent::Workflow),
            "escalation" => Ok(Intent::Escalation),
            other => Err(LlmError::invalid_output(format!(
                "unknown intent label '{}'",
                other
            ))),
        }
    }
}

/// Which path produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Model,
    Fallback,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Model => "model",
            DecisionSource::Fallback => "fallback",
        }
    }
}

/// The routing decision with its justification (used for logging only)
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub reason: String,
    pub source: DecisionSource,
}

/// Model reply shape; the label is validated separately
#[derive(Debug, Deserialize)]
struct RawClassification {
    category: String,
    #[serde(default)]
    reason: String,
}

/// Keyword routing used whenever the model path fails.
///
/// Workflow keywords win over escalation keywords, which win over the default.
pub fn fallback_intent(message: &str) -> Intent {
    let lower = message.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has_any(&["ticket", "close", "status"]) {
        Intent::Workflow
    } else if has_any(&["human", "agent"]) {
        Intent::Escalation
    } else {
        Intent::Knowledge
    }
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    async fn classify_with_model(&self, message: &str) -> Result<Classification, LlmError> {
        let request = CompletionRequest::new(CLASSIFY_SYSTEM, message)
            .with_max_tokens(200)
            .with_temperature(0.0);
        let raw: RawClassification = complete_json(self.llm.as_ref(), request).await?;
        Ok(Classification {
            intent: raw.category.parse()?,
            reason: raw.reason,
            source: DecisionSource::Model,
        })
    }

    /// Classify a message. Never fails: any model failure selects the keyword fallback.
    pub async fn classify(&self, message: &str) -> Classification {
        match self.classify_with_model(message).await {
            Ok(classification) => {
                debug!(
                    intent = %classification.intent,
                    reason = %classification.reason,
                    "classified by model"
                );
                classification
            }
            Err(e) => {
                let intent = fallback_intent(message);
                warn!(intent = %intent, "Classification fell back to keywords: {}", e);
                Classification {
                    intent,
                    reason: format!("keyword fallback ({})", e),
                    source: DecisionSource::Fallback,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmProvider;

    fn classifier(mock: MockLlmProvider) -> IntentClassifier {
        IntentClassifier::new(Arc::new(mock))
    }

    #[test]
    fn test_fallback_keywords() {
        assert_eq!(fallback_intent("Please close my TICKET"), Intent::Workflow);
        assert_eq!(fallback_intent("what's the status?"), Intent::Workflow);
        assert_eq!(fallback_intent("let me talk to a Human"), Intent::Escalation);
        assert_eq!(fallback_intent("How do I set up VPN?"), Intent::Knowledge);
    }

    #[test]
    fn test_fallback_workflow_checked_before_escalation() {
        assert_eq!(
            fallback_intent("agent, what is the status of my ticket"),
            Intent::Workflow
        );
    }

    #[tokio::test]
    async fn test_model_label_used() {
        let mock = MockLlmProvider::new().reply_when(
            "classify",
            r#"{"category": "escalation", "reason": "asks for a person"}"#,
        );
        let result = classifier(mock).classify("open a ticket please").await;
        assert_eq!(result.intent, Intent::Escalation);
        assert_eq!(result.source, DecisionSource::Model);
        assert_eq!(result.reason, "asks for a person");
    }

    #[tokio::test]
    async fn test_invalid_label_falls_back() {
        let mock =
            MockLlmProvider::new().reply_when("classify", r#"{"category": "billing", "reason": ""}"#);
        let result = classifier(mock).classify("my ticket is stuck").await;
        assert_eq!(result.intent, Intent::Workflow);
        assert_eq!(result.source, DecisionSource::Fallback);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back() {
        let mock = MockLlmProvider::new()
            .fail_when("classify", LlmError::network("mock", "connection refused"));
        let result = classifier(mock).classify("I want a human").await;
        assert_eq!(result.intent, Intent::Escalation);
        assert_eq!(result.source, DecisionSource::Fallback);
    }

    #[tokio::test]
    async fn test_ticket_messages_converge() {
        let message = "Can you open a ticket for my laptop";
        let cooperative = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "workflow", "reason": "ticket"}"#);
        let failing = MockLlmProvider::new();

        let primary = classifier(cooperative).classify(message).await;
        let fallback = classifier(failing).classify(message).await;
        assert_eq!(primary.intent, Intent::Workflow);
        assert_eq!(fallback.intent, primary.intent);
    }
}
