//! Data Transfer Objects for the REST API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::metrics::{MetricEvent, MetricsSummary};
use crate::tickets::{Category, NewTicket, Priority};

// =============================================================================
// Health DTOs
// =============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Service status response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    /// Whether the language model has credentials (false = keyword fallbacks)
    pub llm_configured: bool,
    /// Ticket count per status
    pub ticket_counts: BTreeMap<String, usize>,
    pub total_tickets: usize,
    /// Metric events currently retained
    pub metric_events: usize,
}

// =============================================================================
// Chat DTOs
// =============================================================================

/// A support request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
}

// =============================================================================
// Ticket DTOs
// =============================================================================

/// Query parameters for listing tickets
#[derive(Debug, Default, Serialize, Deserialize, IntoParams)]
pub struct TicketListQuery {
    /// "all" (default) or one of open, in_progress, resolved, closed
    pub status: Option<String>,
    /// Maximum tickets returned (default from workflow.direct_list_limit)
    pub limit: Option<usize>,
}

/// Request to create a ticket directly
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTicketRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<Category>,
}

impl From<CreateTicketRequest> for NewTicket {
    fn from(req: CreateTicketRequest) -> Self {
        NewTicket {
            title: req.title,
            description: req.description,
            priority: req.priority,
            category: req.category,
        }
    }
}

/// Request to change a ticket's status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// open, in_progress, resolved or closed
    pub status: String,
}

// =============================================================================
// Metrics DTOs
// =============================================================================

/// Query parameters for the metrics summary
#[derive(Debug, Default, Serialize, Deserialize, IntoParams)]
pub struct MetricsQuery {
    /// Lookback window in seconds (default from metrics.default_window_secs)
    pub window_secs: Option<u64>,
}

/// Rolling summary plus the most recent raw events
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    pub summary: MetricsSummary,
    pub recent: Vec<MetricEvent>,
}
