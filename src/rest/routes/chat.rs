//! Streaming chat endpoint.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::{Stream, StreamExt};

use crate::orchestrator::ChatEvent;
use crate::rest::dto::ChatRequest;
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// Submit a support request and stream the reply.
///
/// Each server-sent event carries one `ChatEvent` as JSON; the stream always
/// ends with a `done` event.
#[utoipa::path(
    post,
    path = "/api/v1/chat",
    tag = "Chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Event stream of ChatEvent records", body = ChatEvent, content_type = "text/event-stream"),
        (status = 400, description = "Empty message", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let events = state
        .orchestrator
        .handle(message)
        .map(|event| Event::default().json_data(&event));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
