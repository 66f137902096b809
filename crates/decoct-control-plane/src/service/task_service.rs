//! TaskService - prescription intake and task workflow operations.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use decoct_core::{
    Action, NewPrescription, PhaseStatus, Prescription, PrescriptionId, Stage, Task, TaskId,
    WorkerId,
};

use crate::broadcast::{BroadcastSink, Topic};
use crate::error::{ServiceError, StoreError};
use crate::repository::Repository;

/// Attempts made when a concurrent writer bumps the task version.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// A prescription together with its derived workflow label.
#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionStatus {
    pub prescription: Prescription,
    pub task: Option<Task>,
    pub phase: PhaseStatus,
}

/// Workflow operations invoked by request handlers.
#[derive(Clone)]
pub struct TaskService {
    repo: Arc<dyn Repository>,
    sink: Option<Arc<dyn BroadcastSink>>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo, sink: None }
    }

    /// Publish `task_update` messages to `sink` after each mutation.
    pub fn with_sink(mut self, sink: Arc<dyn BroadcastSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Persist a new prescription without creating its task.
    pub async fn create_prescription(
        &self,
        input: NewPrescription,
    ) -> Result<Prescription, ServiceError> {
        let prescription = input.into_prescription(Utc::now())?;
        let prescription = self.repo.insert_prescription(prescription).await?;
        info!(prescription_id = %prescription.id, "Prescription created");
        Ok(prescription)
    }

    /// Return the prescription's task, creating it if it does not exist yet.
    pub async fn ensure_task(&self, prescription_id: &PrescriptionId) -> Result<Task, ServiceError> {
        if let Some(task) = self.repo.find_task_by_prescription(prescription_id).await? {
            return Ok(task);
        }

        match self.repo.insert_task(Task::new(prescription_id.clone())).await {
            Ok(task) => {
                info!(task_id = %task.id, prescription_id = %prescription_id, "Task created");
                self.publish(&task);
                Ok(task)
            }
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(prescription_id = %prescription_id, "Task created concurrently, re-reading");
                self.repo
                    .find_task_by_prescription(prescription_id)
                    .await?
                    .ok_or_else(|| StoreError::not_found("task", prescription_id).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create a prescription and its task.
    pub async fn submit_prescription(
        &self,
        input: NewPrescription,
    ) -> Result<(Prescription, Task), ServiceError> {
        let prescription = self.create_prescription(input).await?;
        let task = self.ensure_task(&prescription.id).await?;
        Ok((prescription, task))
    }

    /// Perform a worker action on a task.
    pub async fn perform(
        &self,
        task_id: &TaskId,
        action: Action,
        worker_id: &WorkerId,
    ) -> Result<Task, ServiceError> {
        let task = self
            .mutate(task_id, |task| task.apply(action, worker_id, Utc::now()))
            .await?;
        info!(task_id = %task_id, action = %action, worker_id = %worker_id, "Task action applied");
        Ok(task)
    }

    /// Assign a registered worker to a stage.
    pub async fn assign(
        &self,
        task_id: &TaskId,
        stage: Stage,
        worker_id: &WorkerId,
    ) -> Result<Task, ServiceError> {
        let worker = self
            .repo
            .get_worker(worker_id)
            .await?
            .ok_or_else(|| StoreError::not_found("worker", worker_id))?;

        let task = self
            .mutate(task_id, |task| task.assign(stage, worker.to_ref()))
            .await?;
        info!(task_id = %task_id, stage = %stage, worker_id = %worker_id, "Worker assigned");
        Ok(task)
    }

    /// Undo a completed stage and any later stage that had started.
    pub async fn rollback(&self, task_id: &TaskId, stage: Stage) -> Result<Task, ServiceError> {
        let task = self.mutate(task_id, |task| task.rollback(stage)).await?;
        info!(task_id = %task_id, stage = %stage, "Task rolled back");
        Ok(task)
    }

    /// Derived label for a prescription's task.
    pub async fn task_status(
        &self,
        prescription_id: &PrescriptionId,
    ) -> Result<PhaseStatus, ServiceError> {
        let task = self.repo.find_task_by_prescription(prescription_id).await?;
        Ok(Task::phase_status_of(task.as_ref()))
    }

    /// A prescription with its task and label.
    pub async fn prescription_with_status(
        &self,
        prescription_id: &PrescriptionId,
    ) -> Result<PrescriptionStatus, ServiceError> {
        let prescription = self
            .repo
            .get_prescription(prescription_id)
            .await?
            .ok_or_else(|| StoreError::not_found("prescription", prescription_id))?;
        let task = self.repo.find_task_by_prescription(prescription_id).await?;
        let phase = Task::phase_status_of(task.as_ref());
        Ok(PrescriptionStatus {
            prescription,
            task,
            phase,
        })
    }

    /// Load a task.
    pub async fn get_task(&self, task_id: &TaskId) -> Result<Task, ServiceError> {
        Ok(self.load(task_id).await?)
    }

    async fn load(&self, task_id: &TaskId) -> Result<Task, StoreError> {
        self.repo
            .get_task(task_id)
            .await?
            .ok_or_else(|| StoreError::not_found("task", task_id))
    }

    /// Read, change and write back a task, retrying on version conflicts.
    ///
    /// `change` runs against a freshly loaded copy on every attempt.
    async fn mutate<F>(&self, task_id: &TaskId, change: F) -> Result<Task, ServiceError>
    where
        F: Fn(&mut Task) -> Result<(), decoct_core::CoreError>,
    {
        let mut attempt = 1;
        loop {
            let mut task = self.load(task_id).await?;
            change(&mut task)?;

            match self.repo.update_task(&task).await {
                Ok(stored) => {
                    self.publish(&stored);
                    return Ok(stored);
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_UPDATE_ATTEMPTS => {
                    debug!(task_id = %task_id, attempt, "Task changed concurrently, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn publish(&self, task: &Task) {
        let Some(sink) = &self.sink else {
            return;
        };

        let payload = serde_json::json!({
            "task_id": task.id,
            "status": task.status,
            "phase": task.phase_status(),
            "timestamp": Utc::now(),
        });
        if let Err(e) = sink.publish(Topic::TaskUpdate, payload) {
            debug!(task_id = %task.id, error = %e, "Task update not delivered");
        }
    }
}

impl std::fmt::Debug for TaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService")
            .field("sink", &self.sink.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}
