//! Operational metrics endpoint.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    Json,
};

use crate::rest::dto::{MetricsQuery, MetricsResponse};
use crate::rest::state::ApiState;

/// Rolling metrics summary and the most recent events
#[utoipa::path(
    get,
    path = "/api/v1/metrics",
    tag = "Metrics",
    params(MetricsQuery),
    responses(
        (status = 200, description = "Metrics summary", body = MetricsResponse)
    )
)]
pub async fn summary(
    State(state): State<ApiState>,
    Query(query): Query<MetricsQuery>,
) -> Json<MetricsResponse> {
    let window_secs = query
        .window_secs
        .unwrap_or(state.config.metrics.default_window_secs);

    Json(MetricsResponse {
        summary: state.metrics.summary(Duration::from_secs(window_secs)),
        recent: state.metrics.recent(state.config.metrics.recent_events),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricEvent, MetricKind};
    use crate::rest::test_state;

    #[tokio::test]
    async fn test_summary_uses_default_window() {
        let state = test_state();
        state
            .metrics
            .record(MetricEvent::new(MetricKind::Routing, true));

        let resp = summary(State(state), Query(MetricsQuery::default())).await;
        assert_eq!(resp.summary.window_secs, 3600);
        assert_eq!(resp.summary.total_requests, 1);
        assert_eq!(resp.recent.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_tail_is_capped() {
        let state = test_state();
        for _ in 0..30 {
            state
                .metrics
                .record(MetricEvent::new(MetricKind::Error, false));
        }

        let resp = summary(
            State(state),
            Query(MetricsQuery {
                window_secs: Some(60),
            }),
        )
        .await;
        assert_eq!(resp.summary.window_secs, 60);
        assert_eq!(resp.recent.len(), 20);
    }
}
