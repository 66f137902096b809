//! Decoct Control Plane Library
//!
//! This crate tracks decoction tasks through their three stages, runs the
//! periodic alert rules over them and exposes both over HTTP.

pub mod alerts;
pub mod broadcast;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod metrics;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod state;

pub use alerts::{AlertEngine, Notifier, TickOutcome, TickStatus};
pub use broadcast::{BroadcastSink, ChannelSink, Topic};
pub use config::{AlertThresholds, Config};
pub use error::{ServiceError, StoreError};
pub use repository::{InMemoryRepository, Repository};
pub use scheduler::Scheduler;
pub use service::TaskService;
pub use state::AppState;
