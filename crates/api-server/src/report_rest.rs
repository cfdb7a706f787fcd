//! Read-only report endpoints.
//!
//! Day arguments are `YYYY-MM-DD` in the currently configured reporting
//! offset. Every endpoint accepts `include_excluded` to bypass the
//! exclusion registry for audits.

use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stepline_core::{parse_day, DayRange, StepError, StepResult};
use stepline_reporting::{AttributeRow, FunnelReport, FunnelRow, QueryOptions, SessionsReport};
use utoipa::{IntoParams, ToSchema};

use crate::rest::{api_error, ApiError, AppState, ErrorResponse};

/// Upper bound on the number of steps in one funnel request.
const MAX_FUNNEL_STEPS: usize = 64;

/// Upper bound on the number of days in one report range.
const MAX_RANGE_DAYS: usize = 3660;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DayQuery {
    pub day: String,
    #[serde(default)]
    pub include_excluded: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RangeQuery {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub include_excluded: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScenarioRangeQuery {
    pub scenario: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub include_excluded: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnlistedStepsQuery {
    pub scenario: String,
    pub from: String,
    pub to: String,
    /// Comma-separated steps to leave out (normally the funnel's steps).
    pub steps: Option<String>,
    #[serde(default)]
    pub include_excluded: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionsQuery {
    pub scenario: String,
    pub day: String,
    /// Comma-separated terminal steps; defaults to the configured set.
    pub terminal: Option<String>,
    #[serde(default)]
    pub include_excluded: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttributesQuery {
    pub scenario: String,
    pub step: String,
    /// Dot-separated path into the event metadata, e.g. `deck` or `card.rank`.
    pub path: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub include_excluded: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FunnelRequest {
    pub scenario: String,
    pub from: String,
    pub to: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub include_excluded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DauResponse {
    pub day: NaiveDate,
    pub active_users: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DauRangeResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: Vec<DauResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AverageDauResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub average: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnlistedStepsResponse {
    pub scenario: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Distinct sessions per unlisted step.
    pub steps: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UngroupedResponse {
    pub scenario: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub ungrouped_events: u64,
}

fn day_range(from: &str, to: &str) -> StepResult<DayRange> {
    let range = DayRange::new(parse_day(from)?, parse_day(to)?);
    if range.len() > MAX_RANGE_DAYS {
        return Err(StepError::Validation(format!(
            "range may span at most {} days, got {}",
            MAX_RANGE_DAYS,
            range.len()
        )));
    }
    Ok(range)
}

fn options(include_excluded: bool) -> QueryOptions {
    QueryOptions { include_excluded }
}

/// Split a comma-separated list, dropping blank entries.
fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// GET /v1/reports/dau — Distinct active users on one day.
#[utoipa::path(
    get,
    path = "/v1/reports/dau",
    tag = "Reports",
    params(DayQuery),
    responses(
        (status = 200, description = "Active users", body = DauResponse),
        (status = 400, description = "Malformed day", body = ErrorResponse),
    )
)]
pub async fn handle_dau(
    State(state): State<AppState>,
    Query(query): Query<DayQuery>,
) -> Result<Json<DauResponse>, ApiError> {
    let day = parse_day(&query.day).map_err(api_error)?;
    let active_users = state
        .engine
        .dau(day, options(query.include_excluded))
        .map_err(api_error)?;
    Ok(Json(DauResponse { day, active_users }))
}

/// GET /v1/reports/dau/range — Per-day active users, zero-filled.
#[utoipa::path(
    get,
    path = "/v1/reports/dau/range",
    tag = "Reports",
    params(RangeQuery),
    responses(
        (status = 200, description = "Active users per day", body = DauRangeResponse),
        (status = 400, description = "Malformed day", body = ErrorResponse),
    )
)]
pub async fn handle_dau_range(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<DauRangeResponse>, ApiError> {
    let range = day_range(&query.from, &query.to).map_err(api_error)?;
    let series = state
        .engine
        .dau_range(range, options(query.include_excluded))
        .map_err(api_error)?;
    Ok(Json(DauRangeResponse {
        from: range.from,
        to: range.to,
        days: series
            .into_iter()
            .map(|(day, active_users)| DauResponse { day, active_users })
            .collect(),
    }))
}

/// GET /v1/reports/dau/average — Mean daily active users over a range.
#[utoipa::path(
    get,
    path = "/v1/reports/dau/average",
    tag = "Reports",
    params(RangeQuery),
    responses(
        (status = 200, description = "Average DAU", body = AverageDauResponse),
        (status = 400, description = "Malformed day", body = ErrorResponse),
    )
)]
pub async fn handle_average_dau(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<AverageDauResponse>, ApiError> {
    let range = day_range(&query.from, &query.to).map_err(api_error)?;
    let average = state
        .engine
        .average_dau(range, options(query.include_excluded))
        .map_err(api_error)?;
    Ok(Json(AverageDauResponse {
        from: range.from,
        to: range.to,
        average,
    }))
}

fn funnel_args(request: &FunnelRequest) -> StepResult<DayRange> {
    if request.steps.len() > MAX_FUNNEL_STEPS {
        return Err(StepError::Validation(format!(
            "funnel may list at most {} steps",
            MAX_FUNNEL_STEPS
        )));
    }
    if request.steps.iter().any(|s| s.trim().is_empty()) {
        return Err(StepError::Validation("funnel steps must not be empty".into()));
    }
    day_range(&request.from, &request.to)
}

/// POST /v1/reports/funnel — Distinct sessions per step with drop-offs.
#[utoipa::path(
    post,
    path = "/v1/reports/funnel",
    tag = "Reports",
    request_body = FunnelRequest,
    responses(
        (status = 200, description = "Funnel report", body = FunnelReport),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn handle_funnel(
    State(state): State<AppState>,
    Json(request): Json<FunnelRequest>,
) -> Result<Json<FunnelReport>, ApiError> {
    let range = funnel_args(&request).map_err(api_error)?;
    state
        .engine
        .funnel(
            &request.scenario,
            range,
            &request.steps,
            options(request.include_excluded),
        )
        .map(Json)
        .map_err(api_error)
}

/// POST /v1/reports/funnel/daily — Per-day distinct sessions per step.
#[utoipa::path(
    post,
    path = "/v1/reports/funnel/daily",
    tag = "Reports",
    request_body = FunnelRequest,
    responses(
        (status = 200, description = "One row per day and step", body = [FunnelRow]),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn handle_funnel_daily(
    State(state): State<AppState>,
    Json(request): Json<FunnelRequest>,
) -> Result<Json<Vec<FunnelRow>>, ApiError> {
    let range = funnel_args(&request).map_err(api_error)?;
    state
        .engine
        .funnel_daily(
            &request.scenario,
            range,
            &request.steps,
            options(request.include_excluded),
        )
        .map(Json)
        .map_err(api_error)
}

/// GET /v1/reports/unlisted-steps — Observed steps outside a funnel.
#[utoipa::path(
    get,
    path = "/v1/reports/unlisted-steps",
    tag = "Reports",
    params(UnlistedStepsQuery),
    responses(
        (status = 200, description = "Distinct sessions per unlisted step", body = UnlistedStepsResponse),
        (status = 400, description = "Malformed day", body = ErrorResponse),
    )
)]
pub async fn handle_unlisted_steps(
    State(state): State<AppState>,
    Query(query): Query<UnlistedStepsQuery>,
) -> Result<Json<UnlistedStepsResponse>, ApiError> {
    let range = day_range(&query.from, &query.to).map_err(api_error)?;
    let listed = split_list(query.steps.as_deref());
    let steps = state
        .engine
        .unlisted_steps(&query.scenario, range, &listed, options(query.include_excluded))
        .map_err(api_error)?;
    Ok(Json(UnlistedStepsResponse {
        scenario: query.scenario,
        from: range.from,
        to: range.to,
        steps,
    }))
}

/// GET /v1/reports/ungrouped — Events without a session id.
#[utoipa::path(
    get,
    path = "/v1/reports/ungrouped",
    tag = "Reports",
    params(ScenarioRangeQuery),
    responses(
        (status = 200, description = "Ungrouped event count", body = UngroupedResponse),
        (status = 400, description = "Malformed day", body = ErrorResponse),
    )
)]
pub async fn handle_ungrouped(
    State(state): State<AppState>,
    Query(query): Query<ScenarioRangeQuery>,
) -> Result<Json<UngroupedResponse>, ApiError> {
    let range = day_range(&query.from, &query.to).map_err(api_error)?;
    let ungrouped_events = state
        .engine
        .ungrouped_event_count(&query.scenario, range, options(query.include_excluded))
        .map_err(api_error)?;
    Ok(Json(UngroupedResponse {
        scenario: query.scenario,
        from: range.from,
        to: range.to,
        ungrouped_events,
    }))
}

/// GET /v1/reports/sessions — Sessions started on a day.
#[utoipa::path(
    get,
    path = "/v1/reports/sessions",
    tag = "Reports",
    params(SessionsQuery),
    responses(
        (status = 200, description = "Reconstructed sessions", body = SessionsReport),
        (status = 400, description = "Malformed day", body = ErrorResponse),
    )
)]
pub async fn handle_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<SessionsReport>, ApiError> {
    let day = parse_day(&query.day).map_err(api_error)?;
    let terminal = split_list(query.terminal.as_deref());
    state
        .engine
        .sessions(&query.scenario, day, &terminal, options(query.include_excluded))
        .map(Json)
        .map_err(api_error)
}

/// GET /v1/reports/attributes — Attribute distribution for one step.
#[utoipa::path(
    get,
    path = "/v1/reports/attributes",
    tag = "Reports",
    params(AttributesQuery),
    responses(
        (status = 200, description = "One row per day and attribute value", body = [AttributeRow]),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn handle_attributes(
    State(state): State<AppState>,
    Query(query): Query<AttributesQuery>,
) -> Result<Json<Vec<AttributeRow>>, ApiError> {
    if query.path.trim().is_empty() {
        return Err(api_error(StepError::Validation(
            "'path' must not be empty".into(),
        )));
    }
    let range = day_range(&query.from, &query.to).map_err(api_error)?;
    state
        .engine
        .attribute_stats(
            &query.scenario,
            &query.step,
            &query.path,
            range,
            options(query.include_excluded),
        )
        .map(Json)
        .map_err(api_error)
}
