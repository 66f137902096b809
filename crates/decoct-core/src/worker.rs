//! Worker types.

use crate::WorkerId;
use serde::{Deserialize, Serialize};

/// A pharmacy worker who performs decoction stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Unique worker identifier.
    pub id: WorkerId,

    /// Display name.
    pub name: String,

    /// Contact phone number.
    pub contact_number: Option<String>,

    /// Age, if recorded.
    pub age: Option<u32>,
}

impl Worker {
    /// Create a new Worker with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkerId::generate(),
            name: name.into(),
            contact_number: None,
            age: None,
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: WorkerId) -> Self {
        self.id = id;
        self
    }

    /// Reference to this worker as stored in a task stage slot.
    pub fn to_ref(&self) -> WorkerRef {
        WorkerRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Worker identity and name copied into a task stage slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRef {
    pub id: WorkerId,
    pub name: String,
}

impl WorkerRef {
    pub fn new(id: impl Into<WorkerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
