//! Alerting: rules, deduplication queries, the per-tick engine and the
//! notifier that persists and delivers alerts.

pub mod engine;
pub mod notifier;
pub mod query;
pub mod rules;

pub use engine::{AlertEngine, TickOutcome, TickStatus};
pub use notifier::{DeliveryReport, Notifier, RaiseOutcome};
pub use query::{AlertQuery, StoreAlertQuery};
pub use rules::{default_rules, AlertRule, Snapshot};
