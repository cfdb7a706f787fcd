//! Event ingestion endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use stepline_core::{EventId, NewEvent, StepError};
use tracing::warn;
use utoipa::ToSchema;

use crate::rest::{api_error, ApiError, AppState, ErrorResponse};

/// Maximum length of `scenario` and `step` names.
const MAX_NAME_LEN: usize = 256;

#[derive(Debug, Serialize, ToSchema)]
pub struct AppendResponse {
    pub event_id: EventId,
}

/// Reject events whose names cannot be reported on. Metadata is never
/// inspected here; malformed payloads are stored verbatim.
fn validate_event(event: &NewEvent) -> Result<(), &'static str> {
    if event.scenario.trim().is_empty() {
        return Err("'scenario' must not be empty");
    }
    if event.scenario.len() > MAX_NAME_LEN {
        return Err("'scenario' exceeds maximum length");
    }
    if event.step.trim().is_empty() {
        return Err("'step' must not be empty");
    }
    if event.step.len() > MAX_NAME_LEN {
        return Err("'step' exceeds maximum length");
    }
    Ok(())
}

/// POST /v1/events — Append a step event to the log.
#[utoipa::path(
    post,
    path = "/v1/events",
    tag = "Ingestion",
    request_body = NewEvent,
    responses(
        (status = 201, description = "Event stored", body = AppendResponse),
        (status = 400, description = "Invalid event", body = ErrorResponse),
    )
)]
pub async fn handle_append(
    State(state): State<AppState>,
    Json(event): Json<NewEvent>,
) -> Result<(StatusCode, Json<AppendResponse>), ApiError> {
    if let Err(msg) = validate_event(&event) {
        warn!(scenario = %event.scenario, step = %event.step, error = msg, "Event validation failed");
        metrics::counter!("ingest.validation_errors").increment(1);
        return Err(api_error(StepError::Validation(msg.to_string())));
    }

    let event_id = state.engine.log().append(event).map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(AppendResponse { event_id })))
}
