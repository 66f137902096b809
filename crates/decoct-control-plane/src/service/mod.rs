//! Service layer used by the HTTP handlers.

pub mod task_service;

pub use task_service::{PrescriptionStatus, TaskService};
