//! Direct ticket endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::rest::dto::{CreateTicketRequest, TicketListQuery, UpdateStatusRequest};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;
use crate::tickets::{StatusFilter, Ticket, TicketStatus};

/// List tickets, newest first
#[utoipa::path(
    get,
    path = "/api/v1/tickets",
    tag = "Tickets",
    params(TicketListQuery),
    responses(
        (status = 200, description = "Tickets, newest first", body = Vec<Ticket>),
        (status = 400, description = "Invalid status filter", body = ErrorResponse)
    )
)]
pub async fn list(
    State(state): State<ApiState>,
    Query(query): Query<TicketListQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let filter = match query.status.as_deref() {
        Some(s) => s.parse::<StatusFilter>()?,
        None => StatusFilter::All,
    };
    let limit = query
        .limit
        .unwrap_or(state.config.workflow.direct_list_limit);

    Ok(Json(state.store.list(filter, limit).await?))
}

/// Create a ticket
#[utoipa::path(
    post,
    path = "/api/v1/tickets",
    tag = "Tickets",
    request_body = CreateTicketRequest,
    responses(
        (status = 200, description = "Ticket created", body = Ticket),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn create(
    State(state): State<ApiState>,
    Json(request): Json<CreateTicketRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket = state.store.create(request.into()).await?;
    tracing::info!(ticket_id = ticket.id, "created ticket via API");
    Ok(Json(ticket))
}

/// Get a single ticket by id
#[utoipa::path(
    get,
    path = "/api/v1/tickets/{id}",
    tag = "Tickets",
    params(
        ("id" = u64, Path, description = "Ticket id")
    ),
    responses(
        (status = 200, description = "Ticket details", body = Ticket),
        (status = 404, description = "Ticket not found", body = ErrorResponse)
    )
)]
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<Ticket>, ApiError> {
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Ticket #{} not found", id)))
}

/// Change a ticket's status
#[utoipa::path(
    put,
    path = "/api/v1/tickets/{id}/status",
    tag = "Tickets",
    params(
        ("id" = u64, Path, description = "Ticket id")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Updated ticket", body = Ticket),
        (status = 400, description = "Invalid status", body = ErrorResponse),
        (status = 404, description = "Ticket not found", body = ErrorResponse)
    )
)]
pub async fn update_status(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let status: TicketStatus = request.status.parse()?;
    state
        .store
        .update_status(id, status)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Ticket #{} not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::test_state;
    use crate::tickets::{NewTicket, Priority};

    #[tokio::test]
    async fn test_list_defaults_to_direct_limit() {
        let state = test_state();
        for i in 0..12 {
            state
                .store
                .create(NewTicket::new(format!("Ticket {}", i), ""))
                .await
                .unwrap();
        }

        let resp = list(State(state), Query(TicketListQuery::default()))
            .await
            .unwrap();
        assert_eq!(resp.len(), 10);
        assert_eq!(resp[0].title, "Ticket 11");
    }

    #[tokio::test]
    async fn test_list_rejects_bad_status() {
        let query = TicketListQuery {
            status: Some("pending".to_string()),
            limit: None,
        };
        let result = list(State(test_state()), Query(query)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let state = test_state();
        let created = create(
            State(state.clone()),
            Json(CreateTicketRequest {
                title: "Monitor not working".to_string(),
                description: String::new(),
                priority: Some(Priority::High),
                category: None,
            }),
        )
        .await
        .unwrap();

        let fetched = get_one(State(state), Path(created.id)).await.unwrap();
        assert_eq!(fetched.0, created.0);
        assert_eq!(fetched.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_create_empty_title_rejected() {
        let result = create(
            State(test_state()),
            Json(CreateTicketRequest {
                title: "  ".to_string(),
                description: String::new(),
                priority: None,
                category: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_update_status_missing_ticket() {
        let result = update_status(
            State(test_state()),
            Path(404),
            Json(UpdateStatusRequest {
                status: "closed".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
