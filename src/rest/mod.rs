//! REST API for the helpdesk service.
//!
//! Provides the streaming chat endpoint, direct ticket operations, metrics
//! and the OpenAPI document (with Swagger UI at `/swagger-ui`).

use anyhow::{Context, Result};
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::ApiState;

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        // Chat endpoint
        .route("/api/v1/chat", post(routes::chat::chat))
        // Ticket endpoints
        .route("/api/v1/tickets", get(routes::tickets::list))
        .route("/api/v1/tickets", post(routes::tickets::create))
        .route("/api/v1/tickets/:id", get(routes::tickets::get_one))
        .route(
            "/api/v1/tickets/:id/status",
            put(routes::tickets::update_status),
        )
        // Metrics endpoint
        .route("/api/v1/metrics", get(routes::metrics::summary))
        // OpenAPI document and Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server
pub async fn serve(state: ApiState, host: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("REST API listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// State backed by in-memory components and a provider with no scripted replies
#[cfg(test)]
pub(crate) fn test_state() -> ApiState {
    use std::sync::Arc;

    use crate::app::App;
    use crate::config::Config;
    use crate::knowledge::InMemoryKnowledgeBase;
    use crate::llm::MockLlmProvider;
    use crate::tickets::MemoryTicketStore;

    ApiState::new(App::from_parts(
        Config::default(),
        Arc::new(MockLlmProvider::new()),
        Arc::new(MemoryTicketStore::new()),
        Arc::new(InMemoryKnowledgeBase::default()),
    ))
}
