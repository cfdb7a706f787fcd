//! Shared REST state, error mapping and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use stepline_core::StepError;
use stepline_reporting::AnalyticsEngine;
use tracing::{error, warn};
use utoipa::ToSchema;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalyticsEngine>,
    pub node_id: String,
    pub start_time: Instant,
    /// Set once the journal has been replayed and the listener is bound.
    pub ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(engine: Arc<AnalyticsEngine>, node_id: impl Into<String>) -> Self {
        Self {
            engine,
            node_id: node_id.into(),
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

/// Error type returned by every fallible handler.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map an engine error onto an HTTP status and a JSON body.
///
/// Caller mistakes become 400 with the validation message. Everything else
/// is logged and reported as an opaque 500.
pub fn api_error(err: StepError) -> ApiError {
    if err.is_client_error() {
        warn!(error = %err, "Request rejected");
        metrics::counter!("api.validation_errors").increment(1);
        let code = match err {
            StepError::InvalidOffset(_) => "invalid_offset",
            StepError::InvalidDate(_) => "invalid_date",
            _ => "validation_failed",
        };
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: code.to_string(),
                message: err.to_string(),
            }),
        )
    } else {
        error!(error = %err, "Request failed");
        metrics::counter!("api.errors").increment(1);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "internal_error".to_string(),
                message: "Internal processing error".to_string(),
            }),
        )
    }
}

/// GET /health — Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        events: state.engine.log().len() as u64,
    })
}

/// GET /ready — Readiness probe for Kubernetes.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses(
        (status = 200, description = "Ready to accept traffic"),
        (status = 503, description = "Still starting up"),
    )
)]
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.ready.load(Ordering::Acquire) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — Liveness probe for Kubernetes.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub events: u64,
}
