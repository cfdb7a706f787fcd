//! API server — REST router, HTTP listener and Prometheus exporter.

use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;
use crate::{admin_rest, ingest_rest, report_rest};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use stepline_core::config::AppConfig;
use stepline_reporting::AnalyticsEngine;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

/// Build the full REST router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Ingestion
        .route("/v1/events", post(ingest_rest::handle_append))
        // Administration
        .route(
            "/v1/admin/exclusions",
            get(admin_rest::handle_list_excluded).post(admin_rest::handle_add_excluded),
        )
        .route(
            "/v1/admin/exclusions/:user_id",
            delete(admin_rest::handle_remove_excluded),
        )
        .route(
            "/v1/admin/reporting-offset",
            get(admin_rest::handle_get_offset).put(admin_rest::handle_set_offset),
        )
        // Reports
        .route("/v1/reports/dau", get(report_rest::handle_dau))
        .route("/v1/reports/dau/range", get(report_rest::handle_dau_range))
        .route("/v1/reports/dau/average", get(report_rest::handle_average_dau))
        .route("/v1/reports/funnel", post(report_rest::handle_funnel))
        .route("/v1/reports/funnel/daily", post(report_rest::handle_funnel_daily))
        .route("/v1/reports/unlisted-steps", get(report_rest::handle_unlisted_steps))
        .route("/v1/reports/ungrouped", get(report_rest::handle_ungrouped))
        .route("/v1/reports/sessions", get(report_rest::handle_sessions))
        .route("/v1/reports/attributes", get(report_rest::handle_attributes))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .route("/api-docs/openapi.json", get(openapi_json))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// HTTP front end for one analytics engine.
pub struct ApiServer {
    config: AppConfig,
    engine: Arc<AnalyticsEngine>,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: Arc<AnalyticsEngine>) -> Self {
        Self { config, engine }
    }

    /// Start the HTTP REST server and serve until `shutdown` resolves.
    pub async fn start_http<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = AppState::new(self.engine.clone(), self.config.node_id.clone());
        let app = router(state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        state.mark_ready();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
