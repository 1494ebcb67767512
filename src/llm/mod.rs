//! Language-model capability.
//!
//! The rest of the crate talks to a model only through [`LlmProvider`]:
//! one-shot completions, token streams, and JSON completions validated
//! against a Rust type at this boundary. Provider failures are plain
//! `Result` values so callers pick their fallback with a `match`.

mod anthropic;
mod error;
mod mock;

pub use anthropic::AnthropicProvider;
pub use error::LlmError;
pub use mock::{MockLlmProvider, MockReply};

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::de::DeserializeOwned;

/// A stream of incremental text chunks
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// A single prompt sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instructions
    pub system: String,
    /// User-turn content
    pub prompt: String,
    /// Output token cap; the provider default applies when unset
    pub max_tokens: Option<u32>,
    /// Sampling temperature; the provider default applies when unset
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Trait for language-model providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "anthropic")
    fn name(&self) -> &str;

    /// Check if the provider has credentials
    fn is_configured(&self) -> bool;

    /// Run a completion and return the full text
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// Run a completion and stream text chunks as they arrive
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError>;
}

/// Run a completion that must answer with a JSON object deserializable as `T`.
///
/// Markdown code fences and prose around the object are tolerated; anything
/// else becomes [`LlmError::InvalidOutput`].
pub async fn complete_json<T: DeserializeOwned>(
    provider: &dyn LlmProvider,
    request: CompletionRequest,
) -> Result<T, LlmError> {
    let text = provider.complete(request).await?;
    parse_json_reply(&text)
}

/// Validate a raw model reply against `T`
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let object = extract_json_object(text)
        .ok_or_else(|| LlmError::invalid_output("reply contains no JSON object"))?;
    serde_json::from_str(object).map_err(|e| LlmError::invalid_output(e.to_string()))
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Provider installed when no credentials are available; every call fails
pub struct NotConfiguredProvider {
    provider: String,
}

impl NotConfiguredProvider {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for NotConfiguredProvider {
    fn name(&self) -> &str {
        &self.provider
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
        Err(LlmError::not_configured(&self.provider))
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<TextStream, LlmError> {
        Err(LlmError::not_configured(&self.provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Label {
        category: String,
    }

    #[test]
    fn test_parse_plain_json() {
        let label: Label = parse_json_reply(r#"{"category":"workflow"}"#).unwrap();
        assert_eq!(label.category, "workflow");
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "Here you go:\n```json\n{\"category\": \"knowledge\"}\n```";
        let label: Label = parse_json_reply(reply).unwrap();
        assert_eq!(label.category, "knowledge");
    }

    #[test]
    fn test_parse_rejects_missing_object() {
        let result: Result<Label, _> = parse_json_reply("workflow");
        assert!(matches!(result, Err(LlmError::InvalidOutput(_))));
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let result: Result<Label, _> = parse_json_reply(r#"{"label": 3}"#);
        assert!(matches!(result, Err(LlmError::InvalidOutput(_))));
    }

    #[tokio::test]
    async fn test_not_configured_provider_fails() {
        let provider = NotConfiguredProvider::new("anthropic");
        assert!(!provider.is_configured());
        let err = provider
            .complete(CompletionRequest::new("sys", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured { .. }));
        assert!(provider
            .stream(CompletionRequest::new("sys", "hi"))
            .await
            .is_err());
    }
}
