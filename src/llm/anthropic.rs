//! Anthropic Messages API provider

use std::collections::VecDeque;
use std::env;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CompletionRequest, LlmError, LlmProvider, TextStream};
use crate::config::LlmConfig;

const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const PROVIDER_NAME: &str = "anthropic";

/// Anthropic provider for completions and streamed completions
pub struct AnthropicProvider {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    max_retries: usize,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key
    pub fn new(api_key: impl Into<String>, settings: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("helpdesk/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            max_retries: settings.max_retries,
        })
    }

    /// Create provider from the environment variable named in the settings
    pub fn from_config(settings: &LlmConfig) -> Result<Option<Self>, LlmError> {
        match env::var(&settings.api_key_env) {
            Ok(key) if !key.is_empty() => Ok(Some(Self::new(key, settings)?)),
            _ => Ok(None),
        }
    }

    fn retry_strategy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(8))
            .with_max_times(self.max_retries)
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            stream,
        }
    }

    /// POST to the Messages API, mapping non-success statuses to errors
    async fn send(&self, body: &MessagesRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::network(PROVIDER_NAME, e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200..=299 => Ok(response),
            401 => Err(LlmError::Unauthorized {
                provider: PROVIDER_NAME.to_string(),
            }),
            403 => Err(LlmError::Forbidden {
                provider: PROVIDER_NAME.to_string(),
            }),
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok());
                Err(LlmError::RateLimited {
                    provider: PROVIDER_NAME.to_string(),
                    retry_after_secs,
                })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(LlmError::http(PROVIDER_NAME, status, body))
            }
        }
    }

    async fn send_with_retry(
        &self,
        body: &MessagesRequest<'_>,
    ) -> Result<reqwest::Response, LlmError> {
        let op = || async { self.send(body).await };

        op.retry(self.retry_strategy())
            .when(LlmError::is_transient)
            .notify(|err, dur| {
                warn!("Retrying {} request after {:?}: {}", PROVIDER_NAME, dur, err);
            })
            .await
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = self.body(&request, false);
        let response = self.send_with_retry(&body).await?;

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::invalid_output(e.to_string()))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        debug!(chars = text.len(), "anthropic completion finished");
        Ok(text)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError> {
        let body = self.body(&request, true);
        let response = self.send_with_retry(&body).await?;

        let state = StreamState {
            bytes: Box::pin(response.bytes_stream()),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let stream = futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => state.absorb(&chunk),
                    Some(Err(e)) => {
                        state
                            .pending
                            .push_back(Err(LlmError::network(PROVIDER_NAME, e.to_string())));
                        state.finished = true;
                    }
                    None => state.finished = true,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

struct StreamState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

impl<S> StreamState<S> {
    fn absorb(&mut self, chunk: &[u8]) {
        for data in self.decoder.push(chunk) {
            if self.finished {
                break;
            }
            match parse_stream_event(&data) {
                StreamEvent::Text(text) => self.pending.push_back(Ok(text)),
                StreamEvent::Error(message) => {
                    self.pending
                        .push_back(Err(LlmError::network(PROVIDER_NAME, message)));
                    self.finished = true;
                }
                StreamEvent::Stop => self.finished = true,
                StreamEvent::Ignore => {}
            }
        }
    }
}

/// Incremental decoder for `text/event-stream` bodies yielding each event's data.
///
/// Bytes are buffered until a blank line ends the event, so characters split
/// across network chunks are decoded whole.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&raw);
            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim_start)
                .collect();
            if !data.is_empty() {
                events.push(data.join("\n"));
            }
        }
        events
    }
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Text(String),
    Error(String),
    Stop,
    Ignore,
}

fn parse_stream_event(data: &str) -> StreamEvent {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
        return StreamEvent::Ignore;
    };

    match value["type"].as_str() {
        Some("content_block_delta") if value["delta"]["type"] == "text_delta" => {
            StreamEvent::Text(value["delta"]["text"].as_str().unwrap_or_default().to_string())
        }
        Some("error") => StreamEvent::Error(
            value["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string(),
        ),
        Some("message_stop") => StreamEvent::Stop,
        _ => StreamEvent::Ignore,
    }
}
