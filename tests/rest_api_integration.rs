//! Integration tests for the REST API router.
//!
//! Requests go through the full router (`build_router`) with
//! `tower::ServiceExt::oneshot`; no socket is bound.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use helpdesk::knowledge::InMemoryKnowledgeBase;
use helpdesk::llm::MockLlmProvider;
use helpdesk::rest::{build_router, ApiState};
use helpdesk::tickets::MemoryTicketStore;
use helpdesk::{App, Config};

// ─── Test Context ─────────────────────────────────────────────────────────────

fn router_with(llm: MockLlmProvider) -> Router {
    let app = App::from_parts(
        Config::default(),
        Arc::new(llm),
        Arc::new(MemoryTicketStore::new()),
        Arc::new(InMemoryKnowledgeBase::default()),
    );
    build_router(ApiState::new(app))
}

fn router() -> Router {
    router_with(MockLlmProvider::new())
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_json(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(router, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Parse the `data:` payloads of an SSE body
fn sse_events(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

// ─── Health ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_status() {
    let router = router();

    let (status, health) = send_json(&router, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");

    let (status, body) = send_json(&router, Method::GET, "/api/v1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_tickets"], 0);
    assert_eq!(body["llm_configured"], true);
}

// ─── Tickets ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ticket_lifecycle() {
    let router = router();

    let (status, created) = send_json(
        &router,
        Method::POST,
        "/api/v1/tickets",
        Some(json!({
            "title": "Monitor not working",
            "priority": "high",
            "category": "hardware"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["status"], "open");
    assert_eq!(created["priority"], "high");
    let id = created["id"].as_u64().unwrap();

    let (status, fetched) =
        send_json(&router, Method::GET, &format!("/api/v1/tickets/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, updated) = send_json(
        &router,
        Method::PUT,
        &format!("/api/v1/tickets/{}/status", id),
        Some(json!({ "status": "in_progress" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "in_progress");

    let (_, counts) = send_json(&router, Method::GET, "/api/v1/status", None).await;
    assert_eq!(counts["ticket_counts"]["in_progress"], 1);
    assert_eq!(counts["total_tickets"], 1);
}

#[tokio::test]
async fn test_ticket_errors() {
    let router = router();

    let (status, _) = send(&router, Method::GET, "/api/v1/tickets/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        Method::PUT,
        "/api/v1/tickets/42/status",
        Some(json!({ "status": "closed" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/v1/tickets",
        Some(json!({ "title": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, Method::GET, "/api/v1/tickets?status=pending", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ticket_list_defaults_to_ten() {
    let router = router();
    for i in 1..=12 {
        send(
            &router,
            Method::POST,
            "/api/v1/tickets",
            Some(json!({ "title": format!("Issue {}", i) })),
        )
        .await;
    }

    let (_, listed) = send_json(&router, Method::GET, "/api/v1/tickets", None).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 10);
    assert_eq!(listed[0]["title"], "Issue 12");

    let (_, limited) = send_json(&router, Method::GET, "/api/v1/tickets?limit=3", None).await;
    assert_eq!(limited.as_array().unwrap().len(), 3);
}

// ─── Chat ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_streams_events_and_records_metrics() {
    let router = router_with(
        MockLlmProvider::new()
            .reply_when("classify", r#"{"category": "workflow", "reason": "reset"}"#)
            .reply_when("extract", r#"{"action": "password_reset"}"#)
            .reply_when("final reply", "Follow the reset steps."),
    );

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/v1/chat",
        Some(json!({ "message": "I need to reset my password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events = sse_events(&body);
    assert_eq!(events.first().unwrap()["type"], "status");
    assert_eq!(events.first().unwrap()["agent"], "router");
    assert_eq!(events.last().unwrap(), &json!({ "type": "done" }));

    let text: String = events
        .iter()
        .filter(|e| e["type"] == "text")
        .map(|e| e["content"].as_str().unwrap())
        .collect();
    assert_eq!(text, "Follow the reset steps.");

    let (_, metrics) = send_json(&router, Method::GET, "/api/v1/metrics", None).await;
    assert_eq!(metrics["summary"]["total_requests"], 1);
    assert!(!metrics["recent"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_rejects_blank_message() {
    let (status, _) = send(
        &router(),
        Method::POST,
        "/api/v1/chat",
        Some(json!({ "message": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── OpenAPI ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_openapi_document_served() {
    let (status, doc) = send_json(&router(), Method::GET, "/api/v1/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["info"]["title"], "Helpdesk API");
    assert!(doc["paths"]["/api/v1/tickets/{id}/status"].is_object());
}
