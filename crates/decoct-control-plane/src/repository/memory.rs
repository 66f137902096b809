//! In-memory repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use decoct_core::{
    Alert, AlertId, Prescription, PrescriptionId, Task, TaskId, Worker, WorkerId,
};

use super::{AlertFilter, PrescriptionFilter, Repository, TaskFilter};
use crate::error::StoreError;

/// Repository backed by process memory.
///
/// Each method takes a single lock for its whole read-modify-write, which
/// makes every operation atomic with respect to the others.
#[derive(Default)]
pub struct InMemoryRepository {
    prescriptions: RwLock<HashMap<PrescriptionId, Prescription>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    workers: RwLock<HashMap<WorkerId, Worker>>,
    /// Kept in insertion order, which breaks `created_at` ties.
    alerts: RwLock<Vec<Alert>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert_prescription(
        &self,
        prescription: Prescription,
    ) -> Result<Prescription, StoreError> {
        let mut prescriptions = self.prescriptions.write().await;
        if prescriptions.contains_key(&prescription.id) {
            return Err(StoreError::AlreadyExists {
                entity: "prescription",
                id: prescription.id.to_string(),
            });
        }
        prescriptions.insert(prescription.id.clone(), prescription.clone());
        Ok(prescription)
    }

    async fn get_prescription(
        &self,
        id: &PrescriptionId,
    ) -> Result<Option<Prescription>, StoreError> {
        Ok(self.prescriptions.read().await.get(id).cloned())
    }

    async fn list_prescriptions(
        &self,
        filter: &PrescriptionFilter,
    ) -> Result<Vec<Prescription>, StoreError> {
        let prescriptions = self.prescriptions.read().await;
        let mut result: Vec<Prescription> = prescriptions
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn count_prescriptions(&self, filter: &PrescriptionFilter) -> Result<usize, StoreError> {
        let prescriptions = self.prescriptions.read().await;
        Ok(prescriptions.values().filter(|p| filter.matches(p)).count())
    }

    async fn insert_task(&self, task: Task) -> Result<Task, StoreError> {
        if !self
            .prescriptions
            .read()
            .await
            .contains_key(&task.prescription_id)
        {
            return Err(StoreError::not_found("prescription", &task.prescription_id));
        }

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id)
            || tasks
                .values()
                .any(|t| t.prescription_id == task.prescription_id)
        {
            return Err(StoreError::AlreadyExists {
                entity: "task",
                id: task.prescription_id.to_string(),
            });
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn find_task_by_prescription(
        &self,
        id: &PrescriptionId,
    ) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.values().find(|t| &t.prescription_id == id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut result: Vec<Task> = tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<usize, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.values().filter(|t| filter.matches(t)).count())
    }

    async fn update_task(&self, task: &Task) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(&task.id)
            .ok_or_else(|| StoreError::not_found("task", &task.id))?;

        if stored.version != task.version {
            return Err(StoreError::Conflict {
                entity: "task",
                id: task.id.to_string(),
            });
        }

        *stored = task.clone();
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn insert_worker(&self, worker: Worker) -> Result<Worker, StoreError> {
        let mut workers = self.workers.write().await;
        if workers.contains_key(&worker.id) {
            return Err(StoreError::AlreadyExists {
                entity: "worker",
                id: worker.id.to_string(),
            });
        }
        workers.insert(worker.id.clone(), worker.clone());
        Ok(worker)
    }

    async fn get_worker(&self, id: &WorkerId) -> Result<Option<Worker>, StoreError> {
        Ok(self.workers.read().await.get(id).cloned())
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        let workers = self.workers.read().await;
        let mut result: Vec<Worker> = workers.values().cloned().collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }

    async fn insert_alert(&self, alert: Alert) -> Result<Alert, StoreError> {
        let mut alerts = self.alerts.write().await;
        if alerts.iter().any(|a| a.id == alert.id) {
            return Err(StoreError::AlreadyExists {
                entity: "alert",
                id: alert.id.to_string(),
            });
        }
        alerts.push(alert.clone());
        Ok(alert)
    }

    async fn get_alert(&self, id: &AlertId) -> Result<Option<Alert>, StoreError> {
        let alerts = self.alerts.read().await;
        Ok(alerts.iter().find(|a| &a.id == id).cloned())
    }

    async fn update_alert(&self, alert: &Alert) -> Result<Alert, StoreError> {
        let mut alerts = self.alerts.write().await;
        let stored = alerts
            .iter_mut()
            .find(|a| a.id == alert.id)
            .ok_or_else(|| StoreError::not_found("alert", &alert.id))?;
        stored.acknowledged = alert.acknowledged;
        stored.resolved_at = alert.resolved_at;
        Ok(stored.clone())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let alerts = self.alerts.read().await;
        let mut matching: Vec<Alert> = alerts
            .iter()
            .rev()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        // Stable, so equal timestamps stay newest-inserted first.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }
}
