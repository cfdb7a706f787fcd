//! Integration test for the ingestion, administration and report endpoints.
//! Drives the router in-process; no network or external services needed.

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use stepline_api::{router, AppState};
    use stepline_reporting::AnalyticsEngine;
    use stepline_store::{ExclusionRegistry, MemoryEventLog};
    use tower::ServiceExt;

    fn app() -> Router {
        let engine = Arc::new(AnalyticsEngine::new(
            Arc::new(MemoryEventLog::new()),
            Arc::new(ExclusionRegistry::default()),
            vec!["completed".to_string()],
        ));
        let state = AppState::new(engine, "test-node");
        state.mark_ready();
        router(state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn append(app: &Router, user_id: i64, step: &str, metadata: Value, at: &str) -> u64 {
        let (status, body) = send(
            app,
            "POST",
            "/v1/events",
            Some(json!({
                "scenario": "card_of_day",
                "step": step,
                "user_id": user_id,
                "metadata": metadata,
                "occurred_at": at,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["event_id"].as_u64().unwrap()
    }

    async fn seed_card_of_day(app: &Router) {
        append(app, 42, "initial_resource_selected", json!({"session_id": "s1"}), "2024-05-01T10:01:00Z").await;
        append(
            app,
            42,
            "card_drawn",
            json!({"session_id": "s1", "deck": "classic"}),
            "2024-05-01T10:02:00Z",
        )
        .await;
        append(app, 42, "completed", json!({"session_id": "s1"}), "2024-05-01T10:05:00Z").await;
    }

    #[tokio::test]
    async fn test_card_of_day_flow() {
        let app = app();
        seed_card_of_day(&app).await;

        let (status, funnel) = send(
            &app,
            "POST",
            "/v1/reports/funnel",
            Some(json!({
                "scenario": "card_of_day",
                "from": "2024-05-01",
                "to": "2024-05-01",
                "steps": ["initial_resource_selected", "card_drawn", "completed"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let counts: Vec<u64> = funnel["steps"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["count"].as_u64().unwrap())
            .collect();
        assert_eq!(counts, vec![1, 1, 1]);
        assert!(funnel["dropoffs"]
            .as_array()
            .unwrap()
            .iter()
            .all(|d| d["absolute"] == 0));

        let (status, rows) = send(
            &app,
            "GET",
            "/v1/reports/attributes?scenario=card_of_day&step=card_drawn&path=deck&from=2024-05-01&to=2024-05-01",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            rows,
            json!([{"day": "2024-05-01", "value": "classic", "draw_count": 1, "distinct_user_count": 1}])
        );

        let (_, sessions) = send(&app, "GET", "/v1/reports/sessions?scenario=card_of_day&day=2024-05-01", None).await;
        assert_eq!(sessions["sessions"][0]["session_id"], "s1");
        assert_eq!(sessions["sessions"][0]["is_completed"], true);
        assert_eq!(sessions["sessions"][0]["total_events"], 3);
        assert_eq!(sessions["summary"]["completion_rate"], 100.0);

        let (_, dau) = send(&app, "GET", "/v1/reports/dau?day=2024-05-01", None).await;
        assert_eq!(dau["active_users"], 1);
    }

    #[tokio::test]
    async fn test_exclusion_applies_retroactively() {
        let app = app();
        seed_card_of_day(&app).await;

        let (status, change) = send(&app, "POST", "/v1/admin/exclusions", Some(json!({"user_id": 42}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(change["changed"], true);

        let (_, list) = send(&app, "GET", "/v1/admin/exclusions", None).await;
        assert_eq!(list["excluded"], json!([42]));

        let (_, dau) = send(&app, "GET", "/v1/reports/dau?day=2024-05-01", None).await;
        assert_eq!(dau["active_users"], 0);
        let (_, audit) = send(&app, "GET", "/v1/reports/dau?day=2024-05-01&include_excluded=true", None).await;
        assert_eq!(audit["active_users"], 1);

        let (status, change) = send(&app, "DELETE", "/v1/admin/exclusions/42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(change["changed"], true);
        let (_, dau) = send(&app, "GET", "/v1/reports/dau?day=2024-05-01", None).await;
        assert_eq!(dau["active_users"], 1);
    }

    #[tokio::test]
    async fn test_reporting_offset_reclassifies_days() {
        let app = app();
        append(&app, 7, "card_drawn", json!({"session_id": "late"}), "2024-05-01T22:30:00Z").await;

        let (_, range) = send(&app, "GET", "/v1/reports/dau/range?from=2024-05-01&to=2024-05-02", None).await;
        assert_eq!(range["days"][0]["active_users"], 1);
        assert_eq!(range["days"][1]["active_users"], 0);

        let (status, offset) = send(
            &app,
            "PUT",
            "/v1/admin/reporting-offset",
            Some(json!({"offset": "+03:00"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(offset["offset"], "+03:00");

        let (_, range) = send(&app, "GET", "/v1/reports/dau/range?from=2024-05-01&to=2024-05-02", None).await;
        assert_eq!(range["days"][0]["active_users"], 0);
        assert_eq!(range["days"][1]["active_users"], 1);

        let (_, average) = send(&app, "GET", "/v1/reports/dau/average?from=2024-05-01&to=2024-05-02", None).await;
        assert_eq!(average["average"], 0.5);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_with_400() {
        let app = app();

        let (status, body) = send(
            &app,
            "PUT",
            "/v1/admin/reporting-offset",
            Some(json!({"offset": "GMT+3"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_offset");
        let (_, current) = send(&app, "GET", "/v1/admin/reporting-offset", None).await;
        assert_eq!(current["offset"], "+00:00");

        let (status, body) = send(&app, "GET", "/v1/reports/dau?day=yesterday", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_date");

        let (status, _) = send(
            &app,
            "POST",
            "/v1/events",
            Some(json!({
                "scenario": "",
                "step": "card_drawn",
                "user_id": 1,
                "occurred_at": "2024-05-01T10:00:00Z",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_calendar_edge_days_and_oversized_ranges() {
        let app = app();
        seed_card_of_day(&app).await;
        let (status, _) = send(
            &app,
            "PUT",
            "/v1/admin/reporting-offset",
            Some(json!({"offset": "+03:00"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, dau) = send(&app, "GET", "/v1/reports/dau?day=-262143-01-01", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dau["active_users"], 0);

        let (status, sessions) = send(
            &app,
            "GET",
            "/v1/reports/sessions?scenario=card_of_day&day=-262143-01-01",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sessions["summary"]["total"], 0);

        let (status, body) = send(
            &app,
            "GET",
            "/v1/reports/dau/range?from=-262143-01-01&to=2024-05-01",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");

        let (status, _) = send(
            &app,
            "POST",
            "/v1/reports/funnel/daily",
            Some(json!({
                "scenario": "card_of_day",
                "from": "-262143-01-01",
                "to": "2024-05-01",
                "steps": ["card_drawn"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_stored_and_reported_as_ungrouped() {
        let app = app();
        append(&app, 1, "card_drawn", json!("{oops"), "2024-05-01T10:00:00Z").await;
        append(&app, 2, "card_drawn", json!({"session_id": 17}), "2024-05-01T10:00:00Z").await;
        append(&app, 2, "shared", json!({"session_id": 17}), "2024-05-01T10:01:00Z").await;

        let (_, ungrouped) = send(
            &app,
            "GET",
            "/v1/reports/ungrouped?scenario=card_of_day&from=2024-05-01&to=2024-05-01",
            None,
        )
        .await;
        assert_eq!(ungrouped["ungrouped_events"], 1);

        let (_, unlisted) = send(
            &app,
            "GET",
            "/v1/reports/unlisted-steps?scenario=card_of_day&from=2024-05-01&to=2024-05-01&steps=card_drawn",
            None,
        )
        .await;
        assert_eq!(unlisted["steps"], json!({"shared": 1}));

        let (_, dau) = send(&app, "GET", "/v1/reports/dau?day=2024-05-01", None).await;
        assert_eq!(dau["active_users"], 2);
    }

    #[tokio::test]
    async fn test_unknown_scenario_returns_zeroed_funnel() {
        let app = app();
        let (status, funnel) = send(
            &app,
            "POST",
            "/v1/reports/funnel/daily",
            Some(json!({
                "scenario": "nope",
                "from": "2024-05-01",
                "to": "2024-05-02",
                "steps": ["a"],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(funnel.as_array().unwrap().len(), 2);
        assert!(funnel
            .as_array()
            .unwrap()
            .iter()
            .all(|row| row["distinct_session_count"] == 0));
    }

    #[tokio::test]
    async fn test_operational_endpoints() {
        let app = app();
        let (status, health) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["node_id"], "test-node");

        let (status, _) = send(&app, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, doc) = send(&app, "GET", "/api-docs/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/v1/reports/funnel"].is_object());
    }
}
