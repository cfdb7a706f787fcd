//! Administration endpoints — exclusion registry and reporting offset.
//!
//! Changes take effect on the very next query, for all history.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stepline_core::UserId;
use utoipa::ToSchema;

use crate::rest::{api_error, ApiError, AppState, ErrorResponse};

#[derive(Debug, Serialize, ToSchema)]
pub struct ExcludedUser {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExclusionListResponse {
    /// Ascending user ids.
    pub excluded: Vec<UserId>,
    pub entries: Vec<ExcludedUser>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExclusionRequest {
    pub user_id: UserId,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExclusionChange {
    pub user_id: UserId,
    /// False when the registry already had the requested state.
    pub changed: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OffsetBody {
    /// `±HH:MM`
    pub offset: String,
}

/// GET /v1/admin/exclusions — List excluded users.
#[utoipa::path(
    get,
    path = "/v1/admin/exclusions",
    tag = "Administration",
    responses((status = 200, description = "Excluded users", body = ExclusionListResponse))
)]
pub async fn handle_list_excluded(State(state): State<AppState>) -> Json<ExclusionListResponse> {
    let registry = state.engine.registry();
    let entries: Vec<ExcludedUser> = registry
        .entries()
        .into_iter()
        .map(|e| ExcludedUser {
            user_id: e.user_id,
            created_at: e.created_at,
        })
        .collect();
    Json(ExclusionListResponse {
        excluded: entries.iter().map(|e| e.user_id).collect(),
        entries,
    })
}

/// POST /v1/admin/exclusions — Exclude a user from every report.
#[utoipa::path(
    post,
    path = "/v1/admin/exclusions",
    tag = "Administration",
    request_body = ExclusionRequest,
    responses(
        (status = 201, description = "User excluded", body = ExclusionChange),
        (status = 200, description = "User was already excluded", body = ExclusionChange),
    )
)]
pub async fn handle_add_excluded(
    State(state): State<AppState>,
    Json(request): Json<ExclusionRequest>,
) -> (StatusCode, Json<ExclusionChange>) {
    let changed = state.engine.registry().add_excluded(request.user_id);
    let status = if changed {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(ExclusionChange {
            user_id: request.user_id,
            changed,
        }),
    )
}

/// DELETE /v1/admin/exclusions/:user_id — Re-include a user.
#[utoipa::path(
    delete,
    path = "/v1/admin/exclusions/{user_id}",
    tag = "Administration",
    params(("user_id" = i64, Path, description = "User to re-include")),
    responses((status = 200, description = "Registry updated", body = ExclusionChange))
)]
pub async fn handle_remove_excluded(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Json<ExclusionChange> {
    let changed = state.engine.registry().remove_excluded(user_id);
    Json(ExclusionChange { user_id, changed })
}

/// GET /v1/admin/reporting-offset — Current reporting timezone offset.
#[utoipa::path(
    get,
    path = "/v1/admin/reporting-offset",
    tag = "Administration",
    responses((status = 200, description = "Current offset", body = OffsetBody))
)]
pub async fn handle_get_offset(State(state): State<AppState>) -> Json<OffsetBody> {
    Json(OffsetBody {
        offset: state.engine.registry().reporting_offset().to_string(),
    })
}

/// PUT /v1/admin/reporting-offset — Change the reporting timezone offset.
#[utoipa::path(
    put,
    path = "/v1/admin/reporting-offset",
    tag = "Administration",
    request_body = OffsetBody,
    responses(
        (status = 200, description = "Offset applied", body = OffsetBody),
        (status = 400, description = "Malformed offset", body = ErrorResponse),
    )
)]
pub async fn handle_set_offset(
    State(state): State<AppState>,
    Json(body): Json<OffsetBody>,
) -> Result<Json<OffsetBody>, ApiError> {
    let offset = state
        .engine
        .registry()
        .set_reporting_offset_str(&body.offset)
        .map_err(api_error)?;
    Ok(Json(OffsetBody {
        offset: offset.to_string(),
    }))
}
