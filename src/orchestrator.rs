//! Per-request pipeline: classify, handle, synthesize.
//!
//! Each request runs as its own Tokio task that feeds a bounded channel of
//! [`ChatEvent`]s. Stages run strictly in order. Any failure ends in one
//! apology text event, and every stream ends with exactly one `done` event.
//! A caller that stops listening does not cancel the task; its remaining
//! events are discarded.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, trace, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::agents::prompts::{self, SYNTHESIS_SYSTEM};
use crate::agents::{
    AgentError, EscalationAgent, Intent, IntentClassifier, KnowledgeAgent, WorkflowAgent,
    WorkflowDispatcher, ESCALATION_AGENT, KNOWLEDGE_AGENT, ORCHESTRATOR_AGENT, RESPONDER_AGENT,
    ROUTER_AGENT, WORKFLOW_AGENT,
};
use crate::config::Config;
use crate::knowledge::KnowledgeBase;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::metrics::{MetricEvent, MetricKind, MetricsTracker};
use crate::tickets::TicketStore;

/// Text sent when a request fails at any stage
pub const APOLOGY_MESSAGE: &str = "I'm sorry, something went wrong while handling your request. \
Please try again in a moment, or contact the IT helpdesk directly.";

const EVENT_BUFFER: usize = 64;

/// One record of the streaming reply protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// Progress of a stage, sent before that stage's text
    Status { agent: String, status: String },
    /// An increment of the reply
    Text { content: String },
    /// Terminal marker; nothing follows it
    Done,
}

impl ChatEvent {
    pub fn status(agent: &str, status: &str) -> Self {
        ChatEvent::Status {
            agent: agent.to_string(),
            status: status.to_string(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        ChatEvent::Text {
            content: content.into(),
        }
    }
}

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classifying,
    Handling,
    Synthesizing,
    Done,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Classifying => "classifying",
            Stage::Handling => "handling",
            Stage::Synthesizing => "synthesizing",
            Stage::Done => "done",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
struct StageFailure {
    stage: Stage,
    #[source]
    source: AgentError,
}

impl StageFailure {
    fn at(stage: Stage) -> impl FnOnce(AgentError) -> Self {
        move |source| Self { stage, source }
    }
}

/// Sending half of a request's event stream. Send failures mean the caller
/// went away and are ignored.
struct EventSink {
    tx: mpsc::Sender<ChatEvent>,
    done: AtomicBool,
}

impl EventSink {
    fn new(tx: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            tx,
            done: AtomicBool::new(false),
        }
    }

    /// Send the terminal marker; later calls are no-ops
    async fn finish(&self) {
        if !self.done.swap(true, Ordering::SeqCst) {
            self.send(ChatEvent::Done).await;
        }
    }

    fn is_finished(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    async fn send(&self, event: ChatEvent) {
        if self.tx.send(event).await.is_err() {
            trace!("event receiver dropped; discarding event");
        }
    }

    async fn status(&self, agent: &str, status: &str) {
        self.send(ChatEvent::status(agent, status)).await;
    }

    async fn text(&self, content: impl Into<String>) {
        self.send(ChatEvent::text(content)).await;
    }
}

pub struct Orchestrator {
    classifier: IntentClassifier,
    knowledge: KnowledgeAgent,
    workflow: WorkflowAgent,
    escalation: EscalationAgent,
    llm: Arc<dyn LlmProvider>,
    metrics: Arc<MetricsTracker>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn TicketStore>,
        knowledge: Arc<dyn KnowledgeBase>,
        metrics: Arc<MetricsTracker>,
        config: &Config,
    ) -> Self {
        let dispatcher = WorkflowDispatcher::new(
            Arc::clone(&store),
            config.workflow.list_limit,
            &config.workflow.helpdesk_contact,
        );

        Self {
            classifier: IntentClassifier::new(Arc::clone(&llm)),
            knowledge: KnowledgeAgent::new(knowledge, Arc::clone(&llm), config.knowledge.top_k),
            workflow: WorkflowAgent::new(Arc::clone(&llm), dispatcher),
            escalation: EscalationAgent::new(store, config.escalation.title_chars),
            llm,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsTracker> {
        &self.metrics
    }

    /// Start a request and return its event stream
    pub fn handle(self: &Arc<Self>, message: impl Into<String>) -> ReceiverStream<ChatEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let message = message.into();
        let this = Arc::clone(self);
        let span = info_span!("request", request_id = %Uuid::new_v4());

        tokio::spawn(
            async move {
                let events = EventSink::new(tx);
                let outcome = AssertUnwindSafe(this.run(&message, &events))
                    .catch_unwind()
                    .await;

                if outcome.is_err() {
                    error!("Request pipeline panicked");
                    this.metrics.record(
                        MetricEvent::new(MetricKind::Error, false).with_metadata("stage", "panic"),
                    );
                    if !events.is_finished() {
                        events.text(APOLOGY_MESSAGE).await;
                        events.finish().await;
                    }
                }
            }
            .instrument(span),
        );

        ReceiverStream::new(rx)
    }

    async fn run(&self, message: &str, events: &EventSink) {
        let started = Instant::now();
        info!(chars = message.chars().count(), "handling request");

        let success = match self.pipeline(message, events).await {
            Ok(()) => {
                debug!(stage = %Stage::Done, "request complete");
                true
            }
            Err(failure) => {
                error!(stage = %failure.stage, "Request failed: {}", failure.source);
                debug!(stage = %Stage::Error, "entering error state");
                self.metrics.record(
                    MetricEvent::new(MetricKind::Error, false)
                        .with_metadata("stage", failure.stage.as_str())
                        .with_metadata("error", failure.source.to_string()),
                );
                events.text(APOLOGY_MESSAGE).await;
                false
            }
        };

        events.finish().await;
        self.metrics.record(MetricEvent::latency(
            ORCHESTRATOR_AGENT,
            started.elapsed(),
            success,
        ));
        info!(
            success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
    }

    async fn pipeline(&self, message: &str, events: &EventSink) -> Result<(), StageFailure> {
        debug!(stage = %Stage::Classifying, "stage");
        events.status(ROUTER_AGENT, "Analyzing your request...").await;
        let timer = Instant::now();
        let classification = self.classifier.classify(message).await;

        // No independent ground truth: the routed intent is both prediction and outcome
        let predicted = classification.intent;
        let actual = classification.intent;
        self.metrics.record(
            MetricEvent::new(MetricKind::Routing, predicted == actual)
                .with_agent(ROUTER_AGENT)
                .with_duration(timer.elapsed())
                .with_metadata("predicted", predicted.as_str())
                .with_metadata("actual", actual.as_str())
                .with_metadata("source", classification.source.as_str())
                .with_metadata("reason", classification.reason.as_str()),
        );
        info!(intent = %classification.intent, source = classification.source.as_str(), "routed request");

        debug!(stage = %Stage::Handling, "stage");
        let agent_output = self
            .handle_intent(classification.intent, message, events)
            .await
            .map_err(StageFailure::at(Stage::Handling))?;

        debug!(stage = %Stage::Synthesizing, "stage");
        events.status(RESPONDER_AGENT, "Writing the response...").await;
        let timer = Instant::now();
        let result = self.synthesize(message, &agent_output, events).await;
        self.metrics.record(MetricEvent::latency(
            RESPONDER_AGENT,
            timer.elapsed(),
            result.is_ok(),
        ));
        result.map_err(StageFailure::at(Stage::Synthesizing))
    }

    /// Run the handler selected by `intent` and return its textual output
    async fn handle_intent(
        &self,
        intent: Intent,
        message: &str,
        events: &EventSink,
    ) -> Result<String, AgentError> {
        match intent {
            Intent::Knowledge => {
                events
                    .status(KNOWLEDGE_AGENT, "Searching the knowledge base...")
                    .await;
                let timer = Instant::now();
                let result = self.knowledge.answer(message).await;
                self.metrics.record(MetricEvent::latency(
                    KNOWLEDGE_AGENT,
                    timer.elapsed(),
                    result.is_ok(),
                ));
                let answer = result?;
                self.metrics.record(
                    MetricEvent::new(MetricKind::Retrieval, answer.hit())
                        .with_agent(KNOWLEDGE_AGENT)
                        .with_metadata("documents", answer.documents.len()),
                );
                Ok(answer.answer)
            }
            Intent::Workflow => {
                events
                    .status(WORKFLOW_AGENT, "Working on your request...")
                    .await;
                let timer = Instant::now();
                let result = self.workflow.handle(message).await;
                let elapsed = timer.elapsed();
                self.metrics.record(MetricEvent::latency(
                    WORKFLOW_AGENT,
                    elapsed,
                    result.is_ok(),
                ));
                let result = result?;
                if result.action == "create_ticket" {
                    let mut event = MetricEvent::new(MetricKind::Ticket, result.success)
                        .with_agent(WORKFLOW_AGENT)
                        .with_duration(elapsed);
                    if let Some(id) = result.data.as_ref().and_then(|d| d.get("id")) {
                        event = event.with_metadata("ticket_id", id.clone());
                    }
                    self.metrics.record(event);
                }
                Ok(result.message)
            }
            Intent::Escalation => {
                events
                    .status(ESCALATION_AGENT, "Connecting you with a human agent...")
                    .await;
                let timer = Instant::now();
                let result = self.escalation.escalate(message).await;
                self.metrics.record(MetricEvent::latency(
                    ESCALATION_AGENT,
                    timer.elapsed(),
                    result.is_ok(),
                ));
                Ok(result?.message)
            }
        }
    }

    /// Stream the final reply, one text event per model chunk
    async fn synthesize(
        &self,
        message: &str,
        agent_output: &str,
        events: &EventSink,
    ) -> Result<(), AgentError> {
        let prompt = prompts::synthesis_prompt(agent_output, message)
            .map_err(|e| AgentError::Prompt(e.to_string()))?;
        let mut stream = self
            .llm
            .stream(CompletionRequest::new(SYNTHESIS_SYSTEM, prompt))
            .await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.is_empty() {
                events.text(chunk).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::InMemoryKnowledgeBase;
    use crate::llm::{LlmError, MockLlmProvider, MockReply};
    use crate::tickets::{
        MemoryTicketStore, NewTicket, StatusFilter, StoreError, Ticket, TicketStatus,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingStore;

    #[async_trait]
    impl TicketStore for FailingStore {
        async fn create(&self, _params: NewTicket) -> Result<Ticket, StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn get(&self, _id: u64) -> Result<Option<Ticket>, StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn list(
            &self,
            _filter: StatusFilter,
            _limit: usize,
        ) -> Result<Vec<Ticket>, StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn update_status(
            &self,
            _id: u64,
            _status: TicketStatus,
        ) -> Result<Option<Ticket>, StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn count_by_status(&self) -> Result<Vec<(TicketStatus, usize)>, StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }
    }

    fn orchestrator(mock: MockLlmProvider, store: Arc<dyn TicketStore>) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            Arc::new(mock),
            store,
            Arc::new(InMemoryKnowledgeBase::new(0.0)),
            Arc::new(MetricsTracker::default()),
            &Config::default(),
        ))
    }

    async fn run(orchestrator: &Arc<Orchestrator>, message: &str) -> Vec<ChatEvent> {
        orchestrator.handle(message).collect().await
    }

    fn text_of(events: &[ChatEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_event_wire_format() {
        assert_eq!(
            serde_json::to_value(ChatEvent::status("router", "Analyzing")).unwrap(),
            serde_json::json!({"type": "status", "agent": "router", "status": "Analyzing"})
        );
        assert_eq!(
            serde_json::to_value(ChatEvent::text("Hi")).unwrap(),
            serde_json::json!({"type": "text", "content": "Hi"})
        );
        assert_eq!(
            serde_json::to_value(ChatEvent::Done).unwrap(),
            serde_json::json!({"type": "done"})
        );
    }

    #[tokio::test]
    async fn test_stage_order() {
        let mock = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "workflow", "reason": "reset"}"#)
            .reply_when("extract", r#"{"action": "password_reset"}"#)
            .reply_when("final reply", "Here is how to reset your password.");
        let orch = orchestrator(mock, Arc::new(MemoryTicketStore::new()));

        let events = run(&orch, "I need to reset my password").await;

        assert_eq!(events[0], ChatEvent::status(ROUTER_AGENT, "Analyzing your request..."));
        assert!(matches!(&events[1], ChatEvent::Status { agent, .. } if agent == WORKFLOW_AGENT));
        assert!(matches!(&events[2], ChatEvent::Status { agent, .. } if agent == RESPONDER_AGENT));
        assert_eq!(text_of(&events), "Here is how to reset your password.");
        assert_eq!(events.last(), Some(&ChatEvent::Done));
        assert_eq!(events.iter().filter(|e| **e == ChatEvent::Done).count(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_yields_apology() {
        let mock = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "escalation", "reason": "human"}"#)
            .reply_when("final reply", "should not be used");
        let orch = orchestrator(mock, Arc::new(FailingStore));

        let events = run(&orch, "get me a human").await;

        assert_eq!(text_of(&events), APOLOGY_MESSAGE);
        assert_eq!(events.last(), Some(&ChatEvent::Done));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ChatEvent::Status { agent, .. } if agent == RESPONDER_AGENT)));

        let summary = orch.metrics().summary(Duration::from_secs(60));
        assert_eq!(summary.error_rate, 1.0);
    }

    #[tokio::test]
    async fn test_workflow_fallback_store_failure_yields_apology() {
        let mock = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "workflow", "reason": "broken"}"#)
            .reply_when("extract", r#"{"action": "create_ticket", "title": "Laptop"}"#)
            .reply_when("final reply", "should not be used");
        let orch = orchestrator(mock, Arc::new(FailingStore));

        let events = run(&orch, "my laptop is broken").await;

        assert_eq!(text_of(&events), APOLOGY_MESSAGE);
        assert_eq!(events.last(), Some(&ChatEvent::Done));
        assert_eq!(events.iter().filter(|e| **e == ChatEvent::Done).count(), 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, ChatEvent::Status { agent, .. } if agent == WORKFLOW_AGENT)));
    }

    struct PanickingStore;

    #[async_trait]
    impl TicketStore for PanickingStore {
        async fn create(&self, _params: NewTicket) -> Result<Ticket, StoreError> {
            panic!("store bug");
        }

        async fn get(&self, _id: u64) -> Result<Option<Ticket>, StoreError> {
            Ok(None)
        }

        async fn list(
            &self,
            _filter: StatusFilter,
            _limit: usize,
        ) -> Result<Vec<Ticket>, StoreError> {
            Ok(Vec::new())
        }

        async fn update_status(
            &self,
            _id: u64,
            _status: TicketStatus,
        ) -> Result<Option<Ticket>, StoreError> {
            Ok(None)
        }

        async fn count_by_status(&self) -> Result<Vec<(TicketStatus, usize)>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_panic_in_handler_still_ends_with_done() {
        let mock = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "escalation", "reason": "human"}"#);
        let orch = orchestrator(mock, Arc::new(PanickingStore));

        let events = run(&orch, "get me a human").await;

        assert_eq!(text_of(&events), APOLOGY_MESSAGE);
        assert_eq!(events.last(), Some(&ChatEvent::Done));
        assert_eq!(events.iter().filter(|e| **e == ChatEvent::Done).count(), 1);

        let errors = orch
            .metrics()
            .recent(100)
            .into_iter()
            .filter(|e| e.kind == MetricKind::Error)
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_synthesis_failure_yields_apology() {
        let mock = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "workflow", "reason": "reset"}"#)
            .reply_when("extract", r#"{"action": "password_reset"}"#)
            .fail_when("final reply", LlmError::network("mock", "timeout"));
        let orch = orchestrator(mock, Arc::new(MemoryTicketStore::new()));

        let events = run(&orch, "reset my password").await;
        assert_eq!(text_of(&events), APOLOGY_MESSAGE);
        assert_eq!(events.last(), Some(&ChatEvent::Done));
    }

    #[tokio::test]
    async fn test_partial_stream_then_failure_still_ends_with_done() {
        let mock = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "workflow", "reason": "reset"}"#)
            .reply_when("extract", r#"{"action": "password_reset"}"#)
            .rule(
                "final reply",
                MockReply::PartialThenFail(
                    vec!["To reset ".to_string()],
                    LlmError::network("mock", "reset by peer"),
                ),
            );
        let orch = orchestrator(mock, Arc::new(MemoryTicketStore::new()));

        let events = run(&orch, "reset my password").await;
        assert_eq!(text_of(&events), format!("To reset {}", APOLOGY_MESSAGE));
        assert_eq!(events.last(), Some(&ChatEvent::Done));
    }

    #[tokio::test]
    async fn test_metrics_recorded_per_request() {
        let mock = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "workflow", "reason": "ticket"}"#)
            .reply_when(
                "extract",
                r#"{"action": "create_ticket", "title": "Broken mouse", "category": "hardware"}"#,
            )
            .reply_when("final reply", "Done.");
        let orch = orchestrator(mock, Arc::new(MemoryTicketStore::new()));

        run(&orch, "my mouse is broken").await;

        let events = orch.metrics().recent(100);
        let kinds: Vec<MetricKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MetricKind::Routing,
                MetricKind::Latency,
                MetricKind::Ticket,
                MetricKind::Latency,
                MetricKind::Latency,
            ]
        );
        assert_eq!(events[0].metadata["predicted"], "workflow");
        assert_eq!(events[2].metadata["ticket_id"], 1);
        assert_eq!(events[4].agent.as_deref(), Some(ORCHESTRATOR_AGENT));

        let summary = orch.metrics().summary(Duration::from_secs(60));
        assert_eq!(summary.total_requests, 1);
        assert_eq!(summary.routing_accuracy, 1.0);
        assert_eq!(summary.ticket_success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_knowledge_records_retrieval_miss() {
        let mock = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "knowledge", "reason": "how-to"}"#)
            .reply_when("final reply", "Sorry, nothing found.");
        let orch = orchestrator(mock, Arc::new(MemoryTicketStore::new()));

        let events = run(&orch, "how do I configure the printer").await;
        assert!(matches!(&events[1], ChatEvent::Status { agent, .. } if agent == KNOWLEDGE_AGENT));

        let summary = orch.metrics().summary(Duration::from_secs(60));
        assert_eq!(summary.retrieval_hit_rate, 0.0);
        assert_eq!(summary.error_rate, 0.0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_runs_to_completion() {
        let mock = MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "escalation", "reason": "human"}"#)
            .reply_when("final reply", "Escalated.");
        let store = Arc::new(MemoryTicketStore::new());
        let orch = orchestrator(mock, store.clone());

        drop(orch.handle("I want a human"));

        let finished = async {
            loop {
                let done = orch
                    .metrics()
                    .recent(100)
                    .iter()
                    .any(|e| e.agent.as_deref() == Some(ORCHESTRATOR_AGENT));
                if done {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), finished)
            .await
            .unwrap();

        let tickets = store.list(StatusFilter::All, 10).await.unwrap();
        assert_eq!(tickets.len(), 1);
    }
}
