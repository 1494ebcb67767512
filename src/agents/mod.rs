//! Request handlers: intent classification, workflow actions, escalation and
//! knowledge answers.

pub mod classifier;
pub mod escalation;
pub mod extractor;
pub mod knowledge;
pub mod prompts;
pub mod workflow;

use thiserror::Error;

use crate::knowledge::KnowledgeError;
use crate::llm::LlmError;
use crate::tickets::StoreError;

// Stage names reported in status events and metrics
pub const ROUTER_AGENT: &str = "router";
pub const KNOWLEDGE_AGENT: &str = "knowledge";
pub const WORKFLOW_AGENT: &str = "workflow";
pub const ESCALATION_AGENT: &str = "escalation";
pub const RESPONDER_AGENT: &str = "responder";
pub const ORCHESTRATOR_AGENT: &str = "orchestrator";

// Classification
pub use classifier::{fallback_intent, Classification, DecisionSource, Intent, IntentClassifier};

// Workflow
pub use extractor::{fallback_action, infer_status, ActionDecision, ActionExtractor, ExtractedAction};
pub use workflow::{diagnostics_for, Diagnostics, LogSystem, WorkflowAgent, WorkflowDispatcher, WorkflowResult};

// Escalation and knowledge
pub use escalation::{EscalationAgent, EscalationResult};
pub use knowledge::{KnowledgeAgent, KnowledgeAnswer};

/// Failures that escape a handler and end the request
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error("prompt rendering failed: {0}")]
    Prompt(String),
}
