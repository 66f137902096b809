//! Shared application state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::alerts::{AlertEngine, Notifier};
use crate::broadcast::ChannelSink;
use crate::config::Config;
use crate::repository::{InMemoryRepository, Repository};
use crate::service::TaskService;

/// Shared application state.
pub struct AppState {
    /// Configuration the process was started with.
    pub config: Config,

    /// Workflow records.
    pub repo: Arc<dyn Repository>,

    /// Broadcast channel feeding `/v1/events`.
    pub sink: ChannelSink,

    /// Persists and forwards alerts.
    pub notifier: Arc<Notifier>,

    /// Runs the alert rules.
    pub engine: Arc<AlertEngine>,

    /// Workflow operations.
    pub tasks: TaskService,

    /// Process start time.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state backed by an in-memory repository.
    pub fn new(config: Config) -> Arc<Self> {
        Self::with_repository(config, Arc::new(InMemoryRepository::new()))
    }

    /// Create state backed by `repo`.
    pub fn with_repository(config: Config, repo: Arc<dyn Repository>) -> Arc<Self> {
        let sink = ChannelSink::new(config.broadcast_capacity);
        let notifier = Arc::new(Notifier::new(repo.clone()).with_sink(Arc::new(sink.clone())));
        let engine = Arc::new(AlertEngine::new(
            repo.clone(),
            notifier.clone(),
            config.thresholds.clone(),
        ));
        let tasks = TaskService::new(repo.clone()).with_sink(Arc::new(sink.clone()));

        Arc::new(Self {
            config,
            repo,
            sink,
            notifier,
            engine,
            tasks,
            started_at: Utc::now(),
        })
    }
}
