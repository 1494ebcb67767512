//! Scriptable provider for tests and offline runs.
//!
//! Replies are chosen by the first rule whose needle occurs in the system
//! prompt (case-insensitive). Unmatched calls fail as not configured.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{CompletionRequest, LlmError, LlmProvider, TextStream};

const PROVIDER_NAME: &str = "mock";

/// A scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this text (streamed word by word)
    Text(String),
    /// Fail the call
    Fail(LlmError),
    /// Stream these chunks, then fail
    PartialThenFail(Vec<String>, LlmError),
}

#[derive(Debug, Clone)]
struct MockRule {
    needle: String,
    reply: MockReply,
}

/// Mock implementation of [`LlmProvider`]
#[derive(Debug, Default, Clone)]
pub struct MockLlmProvider {
    rules: Arc<Mutex<Vec<MockRule>>>,
    /// Every request received, in order
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `text` when the system prompt contains `needle`
    pub fn reply_when(self, needle: &str, text: impl Into<String>) -> Self {
        self.rule(needle, MockReply::Text(text.into()))
    }

    /// Fail with `error` when the system prompt contains `needle`
    pub fn fail_when(self, needle: &str, error: LlmError) -> Self {
        self.rule(needle, MockReply::Fail(error))
    }

    pub fn rule(self, needle: &str, reply: MockReply) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockRule {
                needle: needle.to_lowercase(),
                reply,
            });
        self
    }

    /// Requests received so far
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lookup(&self, request: &CompletionRequest) -> MockReply {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let system = request.system.to_lowercase();
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|rule| system.contains(&rule.needle))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| MockReply::Fail(LlmError::not_configured(PROVIDER_NAME)))
    }
}

/// Split text into chunks that concatenate back to the original
fn chunk_words(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        match self.lookup(&request) {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(err) | MockReply::PartialThenFail(_, err) => Err(err),
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError> {
        let items: Vec<Result<String, LlmError>> = match self.lookup(&request) {
            MockReply::Text(text) => chunk_words(&text).into_iter().map(Ok).collect(),
            MockReply::Fail(err) => return Err(err),
            MockReply::PartialThenFail(chunks, err) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(err)))
                .collect(),
        };
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}
