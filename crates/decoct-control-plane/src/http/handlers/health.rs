//! Health, metrics and dashboard handlers.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, Json};
use chrono::Utc;

use crate::dashboard::DashboardMetrics;
use crate::http::responses::ApiError;
use crate::state::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "started_at": state.started_at,
    }))
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = crate::metrics::collect_metrics(&state).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

/// Current dashboard metrics.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardMetrics>, ApiError> {
    let metrics = DashboardMetrics::collect(state.repo.as_ref(), Utc::now()).await?;
    Ok(Json(metrics))
}
