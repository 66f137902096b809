//! Alert handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use decoct_core::{Alert, AlertId};

use crate::alerts::TickOutcome;
use crate::http::responses::{AlertListParams, ApiError};
use crate::state::AppState;

const DEFAULT_KIND_LIMIT: usize = 10;
const DEFAULT_RECENT_HOURS: i64 = 24;
const DEFAULT_RECENT_LIMIT: usize = 50;

/// GET /v1/alerts
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertListParams>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let notifier = &state.notifier;

    let alerts = if params.unread.unwrap_or(false) {
        let mut unread = notifier.unread().await?;
        if let Some(limit) = params.limit {
            unread.truncate(limit);
        }
        unread
    } else if let Some(kind) = params.kind {
        notifier
            .by_kind(kind, params.limit.unwrap_or(DEFAULT_KIND_LIMIT))
            .await?
    } else {
        let hours = params.hours.unwrap_or(DEFAULT_RECENT_HOURS);
        if hours <= 0 {
            return Err(ApiError::bad_request("hours must be positive"));
        }
        notifier
            .recent(hours, params.limit.unwrap_or(DEFAULT_RECENT_LIMIT))
            .await?
    };

    Ok(Json(alerts))
}

/// POST /v1/alerts/:id/ack
pub async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    Ok(Json(state.notifier.acknowledge(&AlertId::new(id)).await?))
}

/// POST /v1/alerts/:id/resolve
pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    Ok(Json(state.notifier.resolve(&AlertId::new(id)).await?))
}

/// Run one alert tick now.
///
/// POST /v1/alerts/run
pub async fn run_alert_checks(State(state): State<Arc<AppState>>) -> Json<TickOutcome> {
    Json(state.engine.run_alert_checks().await)
}
