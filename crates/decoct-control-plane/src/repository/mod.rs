//! Repository abstraction over task, prescription, worker and alert records.
//!
//! The repository is the single source of truth. Every method is one atomic
//! operation; callers re-read state instead of holding records across ticks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use decoct_core::{
    Alert, AlertId, AlertKind, Prescription, PrescriptionId, Stage, Task, TaskId, TaskStatus,
    Worker, WorkerId,
};

use crate::error::StoreError;

mod memory;

pub use memory::InMemoryRepository;

/// A stage timestamp on a Task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Receive,
    Form,
    DecoctionStart,
    DecoctionEnd,
}

impl Stamp {
    fn of(self, task: &Task) -> Option<DateTime<Utc>> {
        match self {
            Self::Receive => task.receive_time,
            Self::Form => task.form_time,
            Self::DecoctionStart => task.decoction_start_time,
            Self::DecoctionEnd => task.decoction_end_time,
        }
    }
}

/// Task query. Every populated criterion must match.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    /// `(stamp, true)` requires the stamp set, `(stamp, false)` unset.
    pub stamps: Vec<(Stamp, bool)>,
    /// Stages that must have some worker assigned.
    pub staffed: Vec<Stage>,
    /// Stage that must be assigned to a specific worker.
    pub assigned_to: Option<(Stage, WorkerId)>,
    /// Lower bound (inclusive) on `decoction_end_time`.
    pub ended_since: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn stamped(mut self, stamp: Stamp) -> Self {
        self.stamps.push((stamp, true));
        self
    }

    pub fn unstamped(mut self, stamp: Stamp) -> Self {
        self.stamps.push((stamp, false));
        self
    }

    pub fn staffed(mut self, stage: Stage) -> Self {
        self.staffed.push(stage);
        self
    }

    pub fn assigned_to(mut self, stage: Stage, worker: WorkerId) -> Self {
        self.assigned_to = Some((stage, worker));
        self
    }

    pub fn ended_since(mut self, since: DateTime<Utc>) -> Self {
        self.ended_since = Some(since);
        self
    }

    /// Check if a task satisfies the filter.
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if self
            .stamps
            .iter()
            .any(|(stamp, set)| stamp.of(task).is_some() != *set)
        {
            return false;
        }
        if self.staffed.iter().any(|stage| task.worker(*stage).is_none()) {
            return false;
        }
        if let Some((stage, worker)) = &self.assigned_to {
            if !task.is_assigned(*stage, worker) {
                return false;
            }
        }
        if let Some(since) = self.ended_since {
            if !task.decoction_end_time.is_some_and(|end| end >= since) {
                return false;
            }
        }
        true
    }
}

/// Prescription query by creation-time range `[created_from, created_before)`.
#[derive(Debug, Clone, Default)]
pub struct PrescriptionFilter {
    pub created_from: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl PrescriptionFilter {
    pub fn between(from: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Self {
        Self {
            created_from: from,
            created_before: before,
        }
    }

    pub fn matches(&self, prescription: &Prescription) -> bool {
        self.created_from.map_or(true, |from| prescription.date >= from)
            && self
                .created_before
                .map_or(true, |before| prescription.date < before)
    }
}

/// Alert query. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub kind: Option<AlertKind>,
    pub task_id: Option<TaskId>,
    pub worker_id: Option<WorkerId>,
    pub acknowledged: Option<bool>,
    /// Lower bound (inclusive) on `created_at`.
    pub created_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AlertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: AlertKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn worker(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    pub fn unacknowledged(mut self) -> Self {
        self.acknowledged = Some(false);
        self
    }

    pub fn created_since(mut self, since: DateTime<Utc>) -> Self {
        self.created_since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.kind.map_or(true, |k| k == alert.kind)
            && self
                .task_id
                .as_ref()
                .map_or(true, |t| alert.task_id.as_ref() == Some(t))
            && self
                .worker_id
                .as_ref()
                .map_or(true, |w| alert.worker_id.as_ref() == Some(w))
            && self.acknowledged.map_or(true, |a| a == alert.acknowledged)
            && self.created_since.map_or(true, |s| alert.created_at >= s)
    }
}

/// Durable store of workflow records.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn insert_prescription(&self, prescription: Prescription)
        -> Result<Prescription, StoreError>;
    async fn get_prescription(
        &self,
        id: &PrescriptionId,
    ) -> Result<Option<Prescription>, StoreError>;
    async fn list_prescriptions(
        &self,
        filter: &PrescriptionFilter,
    ) -> Result<Vec<Prescription>, StoreError>;
    async fn count_prescriptions(&self, filter: &PrescriptionFilter) -> Result<usize, StoreError>;

    /// Insert a task. Fails with `AlreadyExists` if the prescription already
    /// has one.
    async fn insert_task(&self, task: Task) -> Result<Task, StoreError>;
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;
    async fn find_task_by_prescription(
        &self,
        id: &PrescriptionId,
    ) -> Result<Option<Task>, StoreError>;
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;
    async fn count_tasks(&self, filter: &TaskFilter) -> Result<usize, StoreError>;
    /// Replace a task row if its version is unchanged since it was read.
    /// Returns the stored row with its new version.
    async fn update_task(&self, task: &Task) -> Result<Task, StoreError>;

    async fn insert_worker(&self, worker: Worker) -> Result<Worker, StoreError>;
    async fn get_worker(&self, id: &WorkerId) -> Result<Option<Worker>, StoreError>;
    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError>;

    async fn insert_alert(&self, alert: Alert) -> Result<Alert, StoreError>;
    async fn get_alert(&self, id: &AlertId) -> Result<Option<Alert>, StoreError>;
    async fn update_alert(&self, alert: &Alert) -> Result<Alert, StoreError>;
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError>;

    async fn alert_exists(&self, filter: &AlertFilter) -> Result<bool, StoreError> {
        let filter = filter.clone().limit(1);
        Ok(!self.list_alerts(&filter).await?.is_empty())
    }
}
