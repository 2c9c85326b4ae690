//! The event ingress endpoint.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tower::ServiceExt;
use tracing::warn;
use uuid::Uuid;

use super::AppState;
use crate::error::StageError;
use crate::ingress::InboundEvent;
use crate::network::middleware::REQUEST_ID_HEADER;
use crate::network::HealthState;

/// Accepts one event and answers with the stage's reply, an empty 200, or a
/// classified error.
pub async fn event_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.shutdown.health_state() != HealthState::Ready {
        warn!("rejecting event: server is not accepting work");
        return StageError::Overloaded.into_response();
    }
    let _guard = state.shutdown.in_flight_guard();

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let event = InboundEvent {
        request_id,
        headers,
        body,
    };
    match state.pipeline.oneshot(event).await {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}
