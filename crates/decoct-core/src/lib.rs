//! Decoct Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Storage
//! - Runtime specifics
//!
//! It owns the decoction task state machine and the alert records raised
//! about it.

pub mod alert;
pub mod error;
pub mod ids;
pub mod prescription;
pub mod status;
pub mod task;
pub mod worker;

// Re-export commonly used types
pub use alert::{Alert, AlertDraft, AlertKind, Severity};
pub use error::CoreError;
pub use ids::{AlertId, PrescriptionId, TaskId, WorkerId};
pub use prescription::{NewPrescription, Prescription};
pub use status::{Action, PhaseStatus, Stage, TaskState, TaskStatus};
pub use task::Task;
pub use worker::{Worker, WorkerRef};
