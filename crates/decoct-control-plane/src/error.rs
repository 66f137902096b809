//! Control plane errors.

use thiserror::Error;

use decoct_core::CoreError;

/// Repository errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// The row changed since it was read.
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Errors returned by the task service to request handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One alert rule failed during a tick.
#[derive(Debug, Error)]
#[error("Rule '{rule}' failed: {source}")]
pub struct RuleEvaluationError {
    pub rule: &'static str,
    #[source]
    pub source: StoreError,
}

/// Forwarding an alert or update to a sink failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Delivery to '{sink}' failed: {reason}")]
pub struct NotificationDeliveryError {
    pub sink: String,
    pub reason: String,
}
