//! HTTP request handlers.

mod alerts;
mod events;
mod health;
mod tasks;
mod workers;

pub use alerts::{acknowledge_alert, list_alerts, resolve_alert, run_alert_checks};
pub use events::event_stream;
pub use health::{dashboard, health_check, metrics_handler};
pub use tasks::{
    assign_worker, get_task, list_prescriptions, perform_action, prescription_status,
    rollback_task, submit_prescription,
};
pub use workers::{create_worker, list_workers};
