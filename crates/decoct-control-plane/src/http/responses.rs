//! HTTP request and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use decoct_core::{Action, AlertKind, CoreError, Prescription, Stage, Task, WorkerId};

use crate::error::{ServiceError, StoreError};

// ============================================================================
// Task types
// ============================================================================

/// Response body for prescription submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub prescription: Prescription,
    pub task: Task,
}

/// Request body for a worker action.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: Action,
    pub worker_id: WorkerId,
}

/// Request body for a stage assignment.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub stage: Stage,
    pub worker_id: WorkerId,
}

/// Request body for a rollback.
#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub stage: Stage,
}

/// Query string for the prescription list, a creation-time range.
#[derive(Debug, Default, Deserialize)]
pub struct PrescriptionListParams {
    pub from: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

// ============================================================================
// Worker types
// ============================================================================

/// Request body for worker registration.
#[derive(Debug, Deserialize)]
pub struct CreateWorkerRequest {
    pub name: String,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
}

// ============================================================================
// Alert types
// ============================================================================

/// Query string for the alert list.
///
/// `unread` wins over `kind`, which wins over the time window.
#[derive(Debug, Default, Deserialize)]
pub struct AlertListParams {
    pub unread: Option<bool>,
    pub kind: Option<AlertKind>,
    pub hours: Option<i64>,
    pub limit: Option<usize>,
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned from handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } => StatusCode::CONFLICT,
            StoreError::Backend(_) => {
                error!(error = %err, "Storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(e) => e.into(),
            ServiceError::Core(e) => {
                let status = match &e {
                    CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    CoreError::InvalidTransition { .. }
                    | CoreError::InvalidRollback { .. }
                    | CoreError::PrecheckFailed { .. } => StatusCode::CONFLICT,
                };
                Self {
                    status,
                    message: e.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}
