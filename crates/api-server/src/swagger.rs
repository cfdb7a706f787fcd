//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stepline API",
        version = "0.1.0",
        description = "Step event ingestion and session, funnel and active-user analytics.\n\nAll report days are calendar dates in the configured reporting offset.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Ingestion", description = "Append-only step event intake"),
        (name = "Administration", description = "Exclusion registry and reporting offset"),
        (name = "Reports", description = "DAU, funnels, sessions and attribute distributions"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        // Ingestion
        crate::ingest_rest::handle_append,
        // Administration
        crate::admin_rest::handle_list_excluded,
        crate::admin_rest::handle_add_excluded,
        crate::admin_rest::handle_remove_excluded,
        crate::admin_rest::handle_get_offset,
        crate::admin_rest::handle_set_offset,
        // Reports
        crate::report_rest::handle_dau,
        crate::report_rest::handle_dau_range,
        crate::report_rest::handle_average_dau,
        crate::report_rest::handle_funnel,
        crate::report_rest::handle_funnel_daily,
        crate::report_rest::handle_unlisted_steps,
        crate::report_rest::handle_ungrouped,
        crate::report_rest::handle_sessions,
        crate::report_rest::handle_attributes,
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        // Event types
        stepline_core::NewEvent,
        stepline_core::StepEvent,
        crate::ingest_rest::AppendResponse,
        // Administration types
        crate::admin_rest::ExcludedUser,
        crate::admin_rest::ExclusionListResponse,
        crate::admin_rest::ExclusionRequest,
        crate::admin_rest::ExclusionChange,
        crate::admin_rest::OffsetBody,
        // Report types
        crate::report_rest::FunnelRequest,
        crate::report_rest::DauResponse,
        crate::report_rest::DauRangeResponse,
        crate::report_rest::AverageDauResponse,
        crate::report_rest::UnlistedStepsResponse,
        crate::report_rest::UngroupedResponse,
        stepline_reporting::FunnelReport,
        stepline_reporting::FunnelStepResult,
        stepline_reporting::Dropoff,
        stepline_reporting::FunnelRow,
        stepline_reporting::SessionsReport,
        stepline_reporting::Session,
        stepline_reporting::SessionState,
        stepline_reporting::SessionSummary,
        stepline_reporting::AttributeRow,
        // REST error/health types
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
    ))
)]
pub struct ApiDoc;
