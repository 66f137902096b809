//! Prescription and task handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use decoct_core::{NewPrescription, Prescription, PrescriptionId, Task, TaskId};

use crate::http::responses::{
    ActionRequest, ApiError, AssignRequest, PrescriptionListParams, RollbackRequest,
    SubmitResponse,
};
use crate::repository::PrescriptionFilter;
use crate::service::PrescriptionStatus;
use crate::state::AppState;

/// Submit a prescription and create its task.
///
/// POST /v1/prescriptions
pub async fn submit_prescription(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewPrescription>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let (prescription, task) = state.tasks.submit_prescription(req).await?;
    Ok((StatusCode::CREATED, Json(SubmitResponse { prescription, task })))
}

/// List prescriptions created in `[from, before)`, oldest first.
///
/// GET /v1/prescriptions
pub async fn list_prescriptions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PrescriptionListParams>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let filter = PrescriptionFilter::between(params.from, params.before);
    Ok(Json(state.repo.list_prescriptions(&filter).await?))
}

/// GET /v1/prescriptions/:id/status
pub async fn prescription_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PrescriptionStatus>, ApiError> {
    let status = state
        .tasks
        .prescription_with_status(&PrescriptionId::new(id))
        .await?;
    Ok(Json(status))
}

/// GET /v1/tasks/:id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.tasks.get_task(&TaskId::new(id)).await?))
}

/// POST /v1/tasks/:id/actions
pub async fn perform_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .tasks
        .perform(&TaskId::new(id), req.action, &req.worker_id)
        .await?;
    Ok(Json(task))
}

/// POST /v1/tasks/:id/assign
pub async fn assign_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .tasks
        .assign(&TaskId::new(id), req.stage, &req.worker_id)
        .await?;
    Ok(Json(task))
}

/// POST /v1/tasks/:id/rollback
pub async fn rollback_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RollbackRequest>,
) -> Result<Json<Task>, ApiError> {
    let task = state.tasks.rollback(&TaskId::new(id), req.stage).await?;
    Ok(Json(task))
}
