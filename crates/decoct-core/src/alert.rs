//! Operational alert types.

use crate::{AlertId, Stage, TaskId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of operational alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    StageTimeoutReceive,
    StageTimeoutFormulate,
    StageTimeoutDecoction,
    AbnormalFastCompletion,
    Backlog,
    LowEfficiency,
}

impl AlertKind {
    /// All kinds, in rule evaluation order.
    pub fn all() -> &'static [AlertKind] {
        &[
            Self::StageTimeoutReceive,
            Self::StageTimeoutFormulate,
            Self::StageTimeoutDecoction,
            Self::AbnormalFastCompletion,
            Self::Backlog,
            Self::LowEfficiency,
        ]
    }

    /// Timeout kind for a stage.
    pub fn stage_timeout(stage: Stage) -> Self {
        match stage {
            Stage::Receive => Self::StageTimeoutReceive,
            Stage::Formulate => Self::StageTimeoutFormulate,
            Stage::Decoction => Self::StageTimeoutDecoction,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageTimeoutReceive => "stage-timeout-receive",
            Self::StageTimeoutFormulate => "stage-timeout-formulate",
            Self::StageTimeoutDecoction => "stage-timeout-decoction",
            Self::AbnormalFastCompletion => "abnormal-fast-completion",
            Self::Backlog => "backlog",
            Self::LowEfficiency => "low-efficiency",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

/// A persisted operational alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier.
    pub id: AlertId,

    pub kind: AlertKind,

    pub severity: Severity,

    /// Human-readable message.
    pub message: String,

    /// Task the alert is about.
    pub task_id: Option<TaskId>,

    /// Worker the alert is about.
    pub worker_id: Option<WorkerId>,

    /// Structured payload (e.g. backlog count).
    pub payload: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,

    /// Set once an operator has seen the alert.
    pub acknowledged: bool,

    /// Set once an operator has resolved the alert.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Mark as acknowledged. Returns true if the alert changed.
    pub fn acknowledge(&mut self) -> bool {
        let changed = !self.acknowledged;
        self.acknowledged = true;
        changed
    }

    /// Acknowledge and stamp `resolved_at` if unset. Returns true if the
    /// alert changed.
    pub fn resolve(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = self.acknowledge();
        if self.resolved_at.is_none() {
            self.resolved_at = Some(now);
            changed = true;
        }
        changed
    }
}

/// An alert a rule wants raised, before it has an id or timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDraft {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub task_id: Option<TaskId>,
    pub worker_id: Option<WorkerId>,
    pub payload: Option<serde_json::Value>,
}

impl AlertDraft {
    /// Create a new draft.
    pub fn new(kind: AlertKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            task_id: None,
            worker_id: None,
            payload: None,
        }
    }

    /// Builder method to reference a task.
    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Builder method to reference a worker.
    pub fn with_worker(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    /// Builder method to attach a structured payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Turn the draft into a new, unacknowledged alert created at `now`.
    pub fn into_alert(self, now: DateTime<Utc>) -> Alert {
        Alert {
            id: AlertId::generate(),
            kind: self.kind,
            severity: self.severity,
            message: self.message,
            task_id: self.task_id,
            worker_id: self.worker_id,
            payload: self.payload,
            created_at: now,
            acknowledged: false,
            resolved_at: None,
        }
    }
}
