//! Task type and the three-stage workflow state machine.
//!
//! A Task moves strictly forward through
//! `Created -> Received -> Formulated -> DecoctionStarted -> Completed`.
//! Every forward step is keyed by `(action, acting worker)` and only the
//! worker assigned to the matching stage may perform it. Rollback moves a
//! task back to before a completed stage. All operations either apply fully
//! or leave the task untouched.

use crate::{
    Action, CoreError, PhaseStatus, PrescriptionId, Stage, TaskId, TaskState, TaskStatus,
    WorkerId, WorkerRef,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A decoction Task, created once per Prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// The prescription this task fulfils.
    pub prescription_id: PrescriptionId,

    /// Worker assigned to the receive stage.
    pub receive_worker: Option<WorkerRef>,

    /// Worker assigned to the formulate stage.
    pub form_worker: Option<WorkerRef>,

    /// Worker assigned to the decoction stage.
    pub decoction_worker: Option<WorkerRef>,

    /// When the prescription was received.
    pub receive_time: Option<DateTime<Utc>>,

    /// When formulation finished.
    pub form_time: Option<DateTime<Utc>>,

    /// When decoction started.
    pub decoction_start_time: Option<DateTime<Utc>>,

    /// When decoction finished.
    pub decoction_end_time: Option<DateTime<Utc>>,

    /// Overall status; `Done` exactly when `decoction_end_time` is set.
    pub status: TaskStatus,

    /// Row version used by the repository for optimistic updates.
    #[serde(default)]
    pub version: u64,
}

impl Task {
    /// Create a new, unassigned Task for a prescription.
    pub fn new(prescription_id: PrescriptionId) -> Self {
        Self {
            id: TaskId::generate(),
            prescription_id,
            receive_worker: None,
            form_worker: None,
            decoction_worker: None,
            receive_time: None,
            form_time: None,
            decoction_start_time: None,
            decoction_end_time: None,
            status: TaskStatus::Pending,
            version: 0,
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Current workflow state, derived from the most advanced timestamp set.
    pub fn state(&self) -> TaskState {
        if self.decoction_end_time.is_some() {
            TaskState::Completed
        } else if self.decoction_start_time.is_some() {
            TaskState::DecoctionStarted
        } else if self.form_time.is_some() {
            TaskState::Formulated
        } else if self.receive_time.is_some() {
            TaskState::Received
        } else {
            TaskState::Created
        }
    }

    /// Display label for this task.
    pub fn phase_status(&self) -> PhaseStatus {
        self.state().into()
    }

    /// Display label for an optional task row (`Unassigned` when absent).
    pub fn phase_status_of(task: Option<&Task>) -> PhaseStatus {
        task.map_or(PhaseStatus::Unassigned, Task::phase_status)
    }

    /// Check if the task has finished decoction.
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Worker assigned to a stage, if any.
    pub fn worker(&self, stage: Stage) -> Option<&WorkerRef> {
        match stage {
            Stage::Receive => self.receive_worker.as_ref(),
            Stage::Formulate => self.form_worker.as_ref(),
            Stage::Decoction => self.decoction_worker.as_ref(),
        }
    }

    fn worker_slot(&mut self, stage: Stage) -> &mut Option<WorkerRef> {
        match stage {
            Stage::Receive => &mut self.receive_worker,
            Stage::Formulate => &mut self.form_worker,
            Stage::Decoction => &mut self.decoction_worker,
        }
    }

    /// Check if `worker` is assigned to `stage`.
    pub fn is_assigned(&self, stage: Stage, worker: &WorkerId) -> bool {
        self.worker(stage).is_some_and(|w| &w.id == worker)
    }

    /// Check if `worker` is assigned to any of the three stages.
    pub fn involves(&self, worker: &WorkerId) -> bool {
        Stage::all().iter().any(|stage| self.is_assigned(*stage, worker))
    }

    /// Time from receipt to the end of decoction, for completed tasks.
    pub fn processing_duration(&self) -> Option<Duration> {
        match (self.receive_time, self.decoction_end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Apply a worker action at time `now`.
    ///
    /// Fails with [`CoreError::InvalidTransition`] and leaves the task
    /// untouched when the action is not allowed for this worker in the
    /// current state.
    pub fn apply(
        &mut self,
        action: Action,
        worker: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let allowed = !self.is_done()
            && self.is_assigned(action.stage(), worker)
            && match action {
                Action::Receive => self.receive_time.is_none(),
                Action::Formulate => self.receive_time.is_some() && self.form_time.is_none(),
                Action::DecoctionStart => {
                    self.form_time.is_some() && self.decoction_start_time.is_none()
                }
                Action::DecoctionEnd => {
                    self.decoction_start_time.is_some() && self.decoction_end_time.is_none()
                }
            };

        if !allowed {
            return Err(CoreError::InvalidTransition {
                action,
                worker: worker.clone(),
                state: self.state(),
            });
        }

        // Never stamp earlier than the previous stage, even under clock skew.
        let after = |prev: Option<DateTime<Utc>>| prev.map_or(now, |p| p.max(now));

        match action {
            Action::Receive => self.receive_time = Some(now),
            Action::Formulate => self.form_time = Some(after(self.receive_time)),
            Action::DecoctionStart => self.decoction_start_time = Some(after(self.form_time)),
            Action::DecoctionEnd => {
                self.decoction_end_time = Some(after(self.decoction_start_time));
                self.status = TaskStatus::Done;
            }
        }

        Ok(())
    }

    /// Roll the task back to before `stage`.
    ///
    /// Clears the stage's timestamps and worker assignment. A later stage is
    /// cleared too, but only if it had already started, so timestamps stay
    /// ordered and unstarted assignments survive. Fails with
    /// [`CoreError::InvalidRollback`] if `stage` was never completed.
    pub fn rollback(&mut self, stage: Stage) -> Result<(), CoreError> {
        let completed = match stage {
            Stage::Receive => self.receive_time.is_some(),
            Stage::Formulate => self.form_time.is_some(),
            Stage::Decoction => self.decoction_start_time.is_some(),
        };
        if !completed {
            return Err(CoreError::InvalidRollback { stage });
        }

        match stage {
            Stage::Receive => {
                self.receive_time = None;
                self.receive_worker = None;
            }
            Stage::Formulate => self.clear_formulate(),
            Stage::Decoction => self.clear_decoction(),
        }
        if self.receive_time.is_none() && self.form_time.is_some() {
            self.clear_formulate();
        }
        if self.form_time.is_none() && self.decoction_start_time.is_some() {
            self.clear_decoction();
        }

        self.status = if self.decoction_end_time.is_some() {
            TaskStatus::Done
        } else {
            TaskStatus::Pending
        };

        Ok(())
    }

    fn clear_formulate(&mut self) {
        self.form_time = None;
        self.form_worker = None;
    }

    fn clear_decoction(&mut self) {
        self.decoction_start_time = None;
        self.decoction_end_time = None;
        self.decoction_worker = None;
    }

    /// Assign a worker to a stage.
    ///
    /// Formulate requires the task to be received; decoction requires it to
    /// be formulated. Fails with [`CoreError::PrecheckFailed`] otherwise.
    pub fn assign(&mut self, stage: Stage, worker: WorkerRef) -> Result<(), CoreError> {
        let unmet = match stage {
            Stage::Receive => None,
            Stage::Formulate if self.receive_time.is_none() => {
                Some("receive must be completed before assigning formulate")
            }
            Stage::Decoction if self.form_time.is_none() => {
                Some("formulate must be completed before assigning decoction")
            }
            _ => None,
        };

        if let Some(reason) = unmet {
            return Err(CoreError::PrecheckFailed {
                stage,
                reason: reason.to_string(),
            });
        }

        *self.worker_slot(stage) = Some(worker);
        Ok(())
    }

    /// Check the timestamp-ordering and status invariants.
    pub fn check_invariants(&self) -> Result<(), String> {
        let ordered = |later: Option<DateTime<Utc>>, earlier: Option<DateTime<Utc>>, what| {
            match (later, earlier) {
                (Some(_), None) => Err(format!("{what}: set without its predecessor")),
                (Some(l), Some(e)) if l < e => Err(format!("{what}: precedes its predecessor")),
                _ => Ok(()),
            }
        };

        ordered(self.form_time, self.receive_time, "form_time")?;
        ordered(self.decoction_start_time, self.form_time, "decoction_start_time")?;
        ordered(
            self.decoction_end_time,
            self.decoction_start_time,
            "decoction_end_time",
        )?;

        if self.is_done() != self.decoction_end_time.is_some() {
            return Err("status must be done exactly when decoction_end_time is set".into());
        }
        Ok(())
    }
}
