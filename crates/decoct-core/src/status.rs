//! Status enums for Tasks: overall status, workflow state, stages and actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Overall status of a Task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Decoction has not finished yet.
    #[default]
    Pending,
    /// Decoction finished.
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three sequential processing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Receive,
    Formulate,
    Decoction,
}

impl Stage {
    /// All stages in workflow order.
    pub fn all() -> &'static [Stage] {
        &[Stage::Receive, Stage::Formulate, Stage::Decoction]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Formulate => "formulate",
            Self::Decoction => "decoction",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receive" => Ok(Self::Receive),
            "formulate" => Ok(Self::Formulate),
            "decoction" => Ok(Self::Decoction),
            other => Err(CoreError::InvalidInput(format!("unknown stage '{other}'"))),
        }
    }
}

/// A worker action that advances a Task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Receive,
    Formulate,
    DecoctionStart,
    DecoctionEnd,
}

impl Action {
    /// The stage whose assigned worker may perform this action.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Receive => Stage::Receive,
            Self::Formulate => Stage::Formulate,
            Self::DecoctionStart | Self::DecoctionEnd => Stage::Decoction,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Formulate => "formulate",
            Self::DecoctionStart => "decoction_start",
            Self::DecoctionEnd => "decoction_end",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receive" => Ok(Self::Receive),
            "formulate" => Ok(Self::Formulate),
            "decoction_start" => Ok(Self::DecoctionStart),
            "decoction_end" => Ok(Self::DecoctionEnd),
            other => Err(CoreError::InvalidInput(format!("unknown action '{other}'"))),
        }
    }
}

/// Workflow state of a Task, in strict forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Received,
    Formulated,
    DecoctionStarted,
    Completed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Received => "received",
            Self::Formulated => "formulated",
            Self::DecoctionStarted => "decoction_started",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Human-readable projection of a task's stage-timestamp pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    /// No task row exists for the prescription.
    Unassigned,
    AwaitingReceive,
    AwaitingFormulate,
    AwaitingDecoction,
    DecoctionInProgress,
    Completed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::AwaitingReceive => "awaiting-receive",
            Self::AwaitingFormulate => "awaiting-formulate",
            Self::AwaitingDecoction => "awaiting-decoction",
            Self::DecoctionInProgress => "decoction-in-progress",
            Self::Completed => "completed",
        }
    }
}

impl From<TaskState> for PhaseStatus {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Created => Self::AwaitingReceive,
            TaskState::Received => Self::AwaitingFormulate,
            TaskState::Formulated => Self::AwaitingDecoction,
            TaskState::DecoctionStarted => Self::DecoctionInProgress,
            TaskState::Completed => Self::Completed,
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_stage() {
        assert_eq!(Action::Receive.stage(), Stage::Receive);
        assert_eq!(Action::DecoctionStart.stage(), Stage::Decoction);
        assert_eq!(Action::DecoctionEnd.stage(), Stage::Decoction);
    }

    #[test]
    fn test_parse_action() {
        assert_eq!("decoction_end".parse::<Action>(), Ok(Action::DecoctionEnd));
        assert!(matches!(
            "boil".parse::<Action>(),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_phase_status_labels() {
        assert_eq!(PhaseStatus::from(TaskState::Created).as_str(), "awaiting-receive");
        assert_eq!(
            serde_json::to_string(&PhaseStatus::DecoctionInProgress).unwrap(),
            "\"decoction-in-progress\""
        );
    }
}
