//! Core domain errors.

use thiserror::Error;

use crate::status::{Action, Stage, TaskState};
use crate::WorkerId;

/// Core domain errors for the decoction workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The (action, worker) pair is not allowed in the task's current state.
    #[error("Invalid transition: '{action}' by worker '{worker}' not allowed in state {state}")]
    InvalidTransition {
        action: Action,
        worker: WorkerId,
        state: TaskState,
    },

    /// Rollback of a stage that was never completed.
    #[error("Invalid rollback: stage '{stage}' has not been completed")]
    InvalidRollback { stage: Stage },

    /// Assignment precondition violated.
    #[error("Precheck failed for '{stage}' assignment: {reason}")]
    PrecheckFailed { stage: Stage, reason: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
