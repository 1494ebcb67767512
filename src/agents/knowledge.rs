//! Knowledge answers: retrieval followed by a grounded model answer.

use std::sync::Arc;

use tracing::debug;

use super::prompts;
use super::AgentError;
use crate::knowledge::{KnowledgeBase, RetrievedDocument};
use crate::llm::{CompletionRequest, LlmProvider};

pub const NO_DOCUMENTS_ANSWER: &str = "I couldn't find any relevant information in the knowledge base \
for your question. You can ask me to create a support ticket and a technician will follow up.";

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeAnswer {
    pub answer: String,
    pub documents: Vec<RetrievedDocument>,
}

impl KnowledgeAnswer {
    /// Whether retrieval found anything
    pub fn hit(&self) -> bool {
        !self.documents.is_empty()
    }
}

pub struct KnowledgeAgent {
    knowledge: Arc<dyn KnowledgeBase>,
    llm: Arc<dyn LlmProvider>,
    top_k: usize,
}

impl KnowledgeAgent {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>, llm: Arc<dyn LlmProvider>, top_k: usize) -> Self {
        Self {
            knowledge,
            llm,
            top_k,
        }
    }

    pub async fn answer(&self, message: &str) -> Result<KnowledgeAnswer, AgentError> {
        let documents = self.knowledge.search(message, self.top_k).await?;
        debug!(documents = documents.len(), "retrieved knowledge documents");

        if documents.is_empty() {
            return Ok(KnowledgeAnswer {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                documents,
            });
        }

        let system =
            prompts::knowledge_system(&documents).map_err(|e| AgentError::Prompt(e.to_string()))?;
        let answer = self
            .llm
            .complete(CompletionRequest::new(system, message).with_max_tokens(600))
            .await?;

        Ok(KnowledgeAnswer { answer, documents })
    }
}
