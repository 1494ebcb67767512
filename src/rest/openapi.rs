//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::metrics::{MetricEvent, MetricKind, MetricsSummary};
use crate::orchestrator::ChatEvent;
use crate::rest::dto::{
    ChatRequest, CreateTicketRequest, HealthResponse, MetricsResponse, StatusResponse,
    UpdateStatusRequest,
};
use crate::rest::error::ErrorResponse;
use crate::tickets::{Category, Priority, Ticket, TicketStatus};

/// OpenAPI documentation for the helpdesk REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Helpdesk API",
        description = "Routes IT support requests to knowledge, workflow and escalation handlers and streams the reply.",
        license(name = "MIT")
    ),
    paths(
        // Health endpoints
        crate::rest::routes::health::health,
        crate::rest::routes::health::status,
        // Chat endpoint
        crate::rest::routes::chat::chat,
        // Ticket endpoints
        crate::rest::routes::tickets::list,
        crate::rest::routes::tickets::create,
        crate::rest::routes::tickets::get_one,
        crate::rest::routes::tickets::update_status,
        // Metrics endpoint
        crate::rest::routes::metrics::summary,
    ),
    components(
        schemas(
            // Response types
            HealthResponse,
            StatusResponse,
            ChatEvent,
            Ticket,
            TicketStatus,
            Priority,
            Category,
            MetricsResponse,
            MetricsSummary,
            MetricEvent,
            MetricKind,
            ErrorResponse,
            // Request types
            ChatRequest,
            CreateTicketRequest,
            UpdateStatusRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check and status endpoints"),
        (name = "Chat", description = "Streaming support conversations"),
        (name = "Tickets", description = "Direct ticket operations"),
        (name = "Metrics", description = "Operational metrics"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }

    /// Generate the OpenAPI specification as a YAML string
    pub fn yaml() -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&Self::openapi())
    }
}
