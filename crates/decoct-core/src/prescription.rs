//! Prescription types.

use crate::{CoreError, PrescriptionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default status label given to new prescriptions.
pub const DEFAULT_PRESCRIPTION_STATUS: &str = "awaiting-formulation";

/// A prescription issued by a doctor for a patient.
///
/// Exactly one Task is created for every Prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    /// Unique prescription identifier.
    pub id: PrescriptionId,

    /// Patient reference.
    pub patient_id: String,

    /// Prescribing doctor reference.
    pub doctor_id: String,

    /// Creation timestamp. Receive-stage timeouts are measured from here.
    pub date: DateTime<Utc>,

    /// Dosage amount.
    pub amount: f64,

    /// Free-text usage instructions.
    pub usage_instructions: String,

    /// Status label.
    pub status: String,

    /// When the patient expects to pick the decoction up.
    pub expected_pickup_time: Option<DateTime<Utc>>,
}

/// Input for creating a Prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrescription {
    pub patient_id: String,
    pub doctor_id: String,
    pub amount: f64,
    #[serde(default)]
    pub usage_instructions: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expected_pickup_time: Option<DateTime<Utc>>,
}

impl NewPrescription {
    pub fn new(patient_id: impl Into<String>, doctor_id: impl Into<String>, amount: f64) -> Self {
        Self {
            patient_id: patient_id.into(),
            doctor_id: doctor_id.into(),
            amount,
            usage_instructions: String::new(),
            status: None,
            expected_pickup_time: None,
        }
    }

    /// Validate and turn the input into a Prescription dated `now`.
    pub fn into_prescription(self, now: DateTime<Utc>) -> Result<Prescription, CoreError> {
        if self.patient_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("patient_id is required".into()));
        }
        if self.doctor_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("doctor_id is required".into()));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        Ok(Prescription {
            id: PrescriptionId::generate(),
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            date: now,
            amount: self.amount,
            usage_instructions: self.usage_instructions,
            status: self
                .status
                .unwrap_or_else(|| DEFAULT_PRESCRIPTION_STATUS.to_string()),
            expected_pickup_time: self.expected_pickup_time,
        })
    }
}
