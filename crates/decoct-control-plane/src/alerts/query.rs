//! Alert deduplication queries.
//!
//! Rules never touch alert storage directly. They ask an [`AlertQuery`]
//! whether a comparable alert already exists, which keeps them testable
//! with a fake.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use decoct_core::{AlertKind, TaskId, WorkerId};

use crate::error::StoreError;
use crate::repository::{AlertFilter, Repository};

/// Existence checks used to suppress repeat alerts.
#[async_trait]
pub trait AlertQuery: Send + Sync {
    /// An unacknowledged alert of `kind` exists for the task.
    async fn open_for_task(&self, kind: AlertKind, task: &TaskId) -> Result<bool, StoreError>;

    /// Any alert of `kind` was ever raised for the task.
    async fn ever_for_task(&self, kind: AlertKind, task: &TaskId) -> Result<bool, StoreError>;

    /// An unacknowledged alert of `kind` was created at or after `since`.
    async fn open_since(&self, kind: AlertKind, since: DateTime<Utc>) -> Result<bool, StoreError>;

    /// An unacknowledged alert of `kind` for the worker was created at or
    /// after `since`.
    async fn open_for_worker_since(
        &self,
        kind: AlertKind,
        worker: &WorkerId,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// [`AlertQuery`] answered from the repository.
pub struct StoreAlertQuery {
    repo: Arc<dyn Repository>,
}

impl StoreAlertQuery {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl AlertQuery for StoreAlertQuery {
    async fn open_for_task(&self, kind: AlertKind, task: &TaskId) -> Result<bool, StoreError> {
        let filter = AlertFilter::new()
            .kind(kind)
            .task(task.clone())
            .unacknowledged();
        self.repo.alert_exists(&filter).await
    }

    async fn ever_for_task(&self, kind: AlertKind, task: &TaskId) -> Result<bool, StoreError> {
        let filter = AlertFilter::new().kind(kind).task(task.clone());
        self.repo.alert_exists(&filter).await
    }

    async fn open_since(&self, kind: AlertKind, since: DateTime<Utc>) -> Result<bool, StoreError> {
        let filter = AlertFilter::new()
            .kind(kind)
            .unacknowledged()
            .created_since(since);
        self.repo.alert_exists(&filter).await
    }

    async fn open_for_worker_since(
        &self,
        kind: AlertKind,
        worker: &WorkerId,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let filter = AlertFilter::new()
            .kind(kind)
            .worker(worker.clone())
            .unacknowledged()
            .created_since(since);
        self.repo.alert_exists(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use chrono::Duration;
    use decoct_core::{AlertDraft, Severity};

    #[tokio::test]
    async fn test_acknowledged_alert_is_not_open_but_still_counts_as_ever() {
        let repo = Arc::new(InMemoryRepository::new());
        let task = TaskId::new("t-1");
        let mut alert = AlertDraft::new(AlertKind::AbnormalFastCompletion, Severity::Medium, "fast")
            .with_task(task.clone())
            .into_alert(Utc::now());
        alert.acknowledge();
        repo.insert_alert(alert).await.unwrap();

        let query = StoreAlertQuery::new(repo);
        let kind = AlertKind::AbnormalFastCompletion;
        assert!(!query.open_for_task(kind, &task).await.unwrap());
        assert!(query.ever_for_task(kind, &task).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_since_respects_window() {
        let repo = Arc::new(InMemoryRepository::new());
        let created = Utc::now();
        let alert = AlertDraft::new(AlertKind::Backlog, Severity::High, "backlog").into_alert(created);
        repo.insert_alert(alert).await.unwrap();

        let query = StoreAlertQuery::new(repo);
        assert!(query
            .open_since(AlertKind::Backlog, created - Duration::minutes(30))
            .await
            .unwrap());
        assert!(!query
            .open_since(AlertKind::Backlog, created + Duration::seconds(1))
            .await
            .unwrap());
    }
}
