//! Worker handlers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

use decoct_core::Worker;

use crate::http::responses::{ApiError, CreateWorkerRequest};
use crate::state::AppState;

/// List registered workers.
pub async fn list_workers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Worker>>, ApiError> {
    Ok(Json(state.repo.list_workers().await?))
}

/// Register a worker.
pub async fn create_worker(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWorkerRequest>,
) -> Result<(StatusCode, Json<Worker>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let mut worker = Worker::new(req.name);
    worker.contact_number = req.contact_number;
    worker.age = req.age;

    let worker = state.repo.insert_worker(worker).await?;
    info!(worker_id = %worker.id, name = %worker.name, "Worker registered");
    Ok((StatusCode::CREATED, Json(worker)))
}
