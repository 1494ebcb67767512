//! Per-stage operational metrics.
//!
//! The tracker is an explicit component: build one at process start and share
//! it (`Arc<MetricsTracker>`) with everything that records or reads events.
//! It keeps the most recent `capacity` events; appends and eviction happen
//! under one lock so concurrent requests never observe a log over capacity.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Default number of retained events
pub const DEFAULT_CAPACITY: usize = 1000;

/// Kind of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Latency,
    Routing,
    Ticket,
    Retrieval,
    Error,
}

/// One immutable metric record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetricEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub success: bool,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MetricEvent {
    pub fn new(kind: MetricKind, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            agent: None,
            duration_ms: None,
            success,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn latency(agent: &str, duration: Duration, success: bool) -> Self {
        Self::new(MetricKind::Latency, success)
            .with_agent(agent)
            .with_duration(duration)
    }

    pub fn with_agent(mut self, agent: &str) -> Self {
        self.agent = Some(agent.to_string());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Rolling aggregates over a lookback window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetricsSummary {
    pub window_secs: u64,
    /// Requests seen (one routing event per request)
    pub total_requests: usize,
    pub average_latency_ms: f64,
    /// Average latency per agent name
    pub agent_latency_ms: BTreeMap<String, f64>,
    /// Fraction of routing events marked successful
    pub routing_accuracy: f64,
    pub ticket_success_rate: f64,
    pub retrieval_hit_rate: f64,
    /// Error events per request
    pub error_rate: f64,
    /// Events inside the window
    pub event_count: usize,
}

/// Bounded, append-only metric event log
#[derive(Debug)]
pub struct MetricsTracker {
    capacity: usize,
    events: Mutex<VecDeque<MetricEvent>>,
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MetricsTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<MetricEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event, evicting the oldest ones beyond capacity
    pub fn record(&self, event: MetricEvent) {
        let mut events = self.events();
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    /// The most recent `n` events, oldest first
    pub fn recent(&self, n: usize) -> Vec<MetricEvent> {
        let events = self.events();
        let skip = events.len().saturating_sub(n);
        events.iter().skip(skip).cloned().collect()
    }

    /// Drop every retained event. Test hook; nothing in the request path calls it.
    pub fn clear(&self) {
        self.events().clear();
    }

    /// Aggregate the events recorded within `window` of now
    pub fn summary(&self, window: Duration) -> MetricsSummary {
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let windowed: Vec<MetricEvent> = self
            .events()
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect();

        summarize(&windowed, window.as_secs())
    }
}

fn summarize(events: &[MetricEvent], window_secs: u64) -> MetricsSummary {
    let of_kind = |kind: MetricKind| events.iter().filter(move |e| e.kind == kind);

    let routing: Vec<&MetricEvent> = of_kind(MetricKind::Routing).collect();
    let total_requests = routing.len();
    let errors = of_kind(MetricKind::Error).count();

    let latencies: Vec<&MetricEvent> = of_kind(MetricKind::Latency)
        .filter(|e| e.duration_ms.is_some())
        .collect();
    let average_latency_ms = mean(latencies.iter().filter_map(|e| e.duration_ms));

    let mut per_agent: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for event in &latencies {
        if let (Some(agent), Some(ms)) = (&event.agent, event.duration_ms) {
            per_agent.entry(agent.clone()).or_default().push(ms);
        }
    }
    let agent_latency_ms = per_agent
        .into_iter()
        .map(|(agent, values)| (agent, mean(values.into_iter())))
        .collect();

    MetricsSummary {
        window_secs,
        total_requests,
        average_latency_ms,
        agent_latency_ms,
        routing_accuracy: success_rate(routing.into_iter()),
        ticket_success_rate: success_rate(of_kind(MetricKind::Ticket)),
        retrieval_hit_rate: success_rate(of_kind(MetricKind::Retrieval)),
        error_rate: ratio(errors, total_requests),
        event_count: events.len(),
    }
}

fn mean(values: impl Iterator<Item = u64>) -> f64 {
    let (sum, count) = values.fold((0u64, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

fn success_rate<'a>(events: impl Iterator<Item = &'a MetricEvent>) -> f64 {
    let (ok, total) = events.fold((0usize, 0usize), |(ok, total), e| {
        (ok + usize::from(e.success), total + 1)
    });
    ratio(ok, total)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn numbered(i: usize) -> MetricEvent {
        MetricEvent::new(MetricKind::Latency, true).with_metadata("seq", i)
    }

    #[test]
    fn test_retains_most_recent_in_order() {
        let tracker = MetricsTracker::new(1000);
        for i in 0..1001 {
            tracker.record(numbered(i));
        }

        assert_eq!(tracker.len(), 1000);
        let events = tracker.recent(1000);
        let seqs: Vec<u64> = events
            .iter()
            .map(|e| e.metadata["seq"].as_u64().unwrap())
            .collect();
        let expected: Vec<u64> = (1..1001).collect();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn test_recent_tail() {
        let tracker = MetricsTracker::new(10);
        for i in 0..5 {
            tracker.record(numbered(i));
        }
        let tail = tracker.recent(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].metadata["seq"], 3);
        assert_eq!(tail[1].metadata["seq"], 4);
        assert_eq!(tracker.recent(50).len(), 5);
    }

    #[test]
    fn test_clear() {
        let tracker = MetricsTracker::new(10);
        tracker.record(numbered(0));
        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_empty_summary_is_zeroed() {
        let tracker = MetricsTracker::default();
        let summary = tracker.summary(Duration::from_secs(60));
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.average_latency_ms, 0.0);
        assert_eq!(summary.routing_accuracy, 0.0);
        assert_eq!(summary.error_rate, 0.0);
    }

    #[test]
    fn test_summary_rates() {
        let tracker = MetricsTracker::default();
        tracker.record(MetricEvent::new(MetricKind::Routing, true));
        tracker.record(MetricEvent::new(MetricKind::Routing, true));
        tracker.record(MetricEvent::new(MetricKind::Routing, false));
        tracker.record(MetricEvent::new(MetricKind::Routing, true));
        tracker.record(MetricEvent::new(MetricKind::Ticket, true));
        tracker.record(MetricEvent::new(MetricKind::Ticket, false));
        tracker.record(MetricEvent::new(MetricKind::Retrieval, true));
        tracker.record(MetricEvent::new(MetricKind::Error, false));
        tracker.record(MetricEvent::latency(
            "workflow",
            Duration::from_millis(100),
            true,
        ));
        tracker.record(MetricEvent::latency(
            "workflow",
            Duration::from_millis(300),
            true,
        ));
        tracker.record(MetricEvent::latency(
            "router",
            Duration::from_millis(50),
            true,
        ));

        let summary = tracker.summary(Duration::from_secs(3600));
        assert_eq!(summary.total_requests, 4);
        assert_eq!(summary.routing_accuracy, 0.75);
        assert_eq!(summary.ticket_success_rate, 0.5);
        assert_eq!(summary.retrieval_hit_rate, 1.0);
        assert_eq!(summary.error_rate, 0.25);
        assert_eq!(summary.average_latency_ms, 150.0);
        assert_eq!(summary.agent_latency_ms["workflow"], 200.0);
        assert_eq!(summary.agent_latency_ms["router"], 50.0);
        assert_eq!(summary.event_count, 11);
    }

    #[test]
    fn test_summary_window_excludes_old_events() {
        let tracker = MetricsTracker::default();
        let mut old = MetricEvent::new(MetricKind::Routing, true);
        old.timestamp = Utc::now() - chrono::Duration::hours(2);
        tracker.record(old);
        tracker.record(MetricEvent::new(MetricKind::Routing, false));

        let summary = tracker.summary(Duration::from_secs(3600));
        assert_eq!(summary.total_requests, 1);
        assert_eq!(summary.routing_accuracy, 0.0);

        let summary = tracker.summary(Duration::from_secs(3 * 3600));
        assert_eq!(summary.total_requests, 2);
    }

    #[test]
    fn test_concurrent_appends_respect_capacity() {
        let tracker = Arc::new(MetricsTracker::new(100));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        tracker.record(numbered(t * 50 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.len(), 100);
    }

    #[test]
    fn test_event_serialization_skips_empty_optionals() {
        let event = MetricEvent::new(MetricKind::Error, false);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "error");
        assert!(json.get("agent").is_none());
        assert!(json.get("duration_ms").is_none());
    }
}
