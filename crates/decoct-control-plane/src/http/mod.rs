//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Prescription intake and task workflow (`/v1/prescriptions`, `/v1/tasks`)
//! - Worker registry (`/v1/workers`)
//! - Alerts and on-demand checks (`/v1/alerts`)
//! - Live event stream (`/v1/events`)
//! - Dashboard (`/v1/dashboard`), health (`/health`) and Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer for dashboard access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Workflow routes
        .route(
            "/v1/prescriptions",
            get(handlers::list_prescriptions).post(handlers::submit_prescription),
        )
        .route(
            "/v1/prescriptions/:id/status",
            get(handlers::prescription_status),
        )
        .route("/v1/tasks/:id", get(handlers::get_task))
        .route("/v1/tasks/:id/actions", post(handlers::perform_action))
        .route("/v1/tasks/:id/assign", post(handlers::assign_worker))
        .route("/v1/tasks/:id/rollback", post(handlers::rollback_task))
        .route(
            "/v1/workers",
            get(handlers::list_workers).post(handlers::create_worker),
        )
        // Alert routes
        .route("/v1/alerts", get(handlers::list_alerts))
        .route("/v1/alerts/run", post(handlers::run_alert_checks))
        .route("/v1/alerts/:id/ack", post(handlers::acknowledge_alert))
        .route("/v1/alerts/:id/resolve", post(handlers::resolve_alert))
        // Live routes
        .route("/v1/events", get(handlers::event_stream))
        .route("/v1/dashboard", get(handlers::dashboard))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn router() -> Router {
        create_router(AppState::new(Config::default()))
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&router(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_workflow_over_http() {
        let router = router();

        let (status, worker) = send(&router, "POST", "/v1/workers", Some(json!({ "name": "Li" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let worker_id = worker["id"].as_str().unwrap().to_string();

        let (status, submitted) = send(
            &router,
            "POST",
            "/v1/prescriptions",
            Some(json!({ "patient_id": "p-1", "doctor_id": "d-1", "amount": 2.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let task_id = submitted["task"]["id"].as_str().unwrap().to_string();
        let prescription_id = submitted["prescription"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &router,
            "POST",
            &format!("/v1/tasks/{task_id}/assign"),
            Some(json!({ "stage": "receive", "worker_id": worker_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Someone else cannot act on the stage.
        let (status, body) = send(
            &router,
            "POST",
            &format!("/v1/tasks/{task_id}/actions"),
            Some(json!({ "action": "receive", "worker_id": "intruder" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        let (status, task) = send(
            &router,
            "POST",
            &format!("/v1/tasks/{task_id}/actions"),
            Some(json!({ "action": "receive", "worker_id": worker_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(task["receive_time"].is_string());

        let (status, body) = send(
            &router,
            "GET",
            &format!("/v1/prescriptions/{prescription_id}/status"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "awaiting-formulate");

        let (status, listed) = send(&router, "GET", "/v1/prescriptions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["id"], prescription_id.as_str());

        let (_, future) = send(
            &router,
            "GET",
            "/v1/prescriptions?from=2999-01-01T00:00:00Z",
            None,
        )
        .await;
        assert!(future.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_prescription_is_bad_request() {
        let (status, _) = send(
            &router(),
            "POST",
            "/v1/prescriptions",
            Some(json!({ "patient_id": "p-1", "doctor_id": "d-1", "amount": 0.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let router = router();
        let (status, _) = send(&router, "GET", "/v1/tasks/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&router, "POST", "/v1/alerts/missing/ack", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_alert_checks_and_list() {
        let router = router();
        for i in 0..11 {
            send(
                &router,
                "POST",
                "/v1/prescriptions",
                Some(json!({ "patient_id": format!("p-{i}"), "doctor_id": "d", "amount": 1.0 })),
            )
            .await;
        }

        let (status, outcome) = send(&router, "POST", "/v1/alerts/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["status"], "success");
        assert_eq!(outcome["raised"][0]["kind"], "backlog");

        let (status, alerts) = send(&router, "GET", "/v1/alerts?kind=backlog", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(alerts.as_array().unwrap().len(), 1);
        let alert_id = alerts[0]["id"].as_str().unwrap().to_string();

        let (status, acked) = send(&router, "POST", &format!("/v1/alerts/{alert_id}/ack"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(acked["acknowledged"], true);

        let (_, unread) = send(&router, "GET", "/v1/alerts?unread=true", None).await;
        assert!(unread.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_and_dashboard() {
        let router = router();
        let response = router
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("decoct_tasks_total"));

        let (status, dashboard) = send(&router, "GET", "/v1/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["metrics"]["total_tasks"], 0);
    }

    #[tokio::test]
    async fn test_alert_window_bounds() {
        let router = router();
        let (status, alerts) = send(&router, "GET", "/v1/alerts?hours=9000000000000", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(alerts.as_array().unwrap().is_empty());

        let (status, _) = send(&router, "GET", "/v1/alerts?hours=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_event_stream_opens_with_dashboard() {
        use futures_util::StreamExt;

        let response = router()
            .oneshot(Request::builder().uri("/v1/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let text = String::from_utf8_lossy(&first);
        assert!(text.contains("event: dashboard_update"));
        assert!(text.contains("total_tasks"));
    }
}
