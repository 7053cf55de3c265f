//! Prescription record and validating create input.
//!
//! # Responsibility
//! - Define the stored `Prescription` shape and its wire field names.
//! - Enforce field-level constraints in `NewPrescription::new`.
//!
//! # Invariants
//! - `appointment_id`, `patient_id`, `doctor_id` and `days` are positive.
//! - `medication` and `dosage` are not blank.
//! - Referential ids are opaque; existence is never checked here.
//! - Text fields are kept exactly as given; trimming is only used to decide
//!   blankness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned prescription identifier.
pub type PrescriptionId = i64;

/// Persisted prescription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub prescription_id: PrescriptionId,
    pub appointment_id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub medication: String,
    pub dosage: String,
    /// Course length in days.
    pub days: i64,
    /// Stamped once by the store at millisecond precision; serialized as
    /// RFC 3339 in UTC.
    pub issued_at: DateTime<Utc>,
}

impl Prescription {
    /// Re-checks stored field constraints.
    ///
    /// Used by read paths so that rows written around the store surface as
    /// errors instead of being returned.
    pub fn validate(&self) -> Result<(), PrescriptionValidationError> {
        let mut violations = collect_violations(
            self.appointment_id,
            self.patient_id,
            self.doctor_id,
            &self.medication,
            &self.dosage,
            self.days,
        );
        if self.prescription_id <= 0 {
            violations.insert(
                0,
                FieldViolation::new("prescription_id", ViolationReason::NotPositive),
            );
        }
        PrescriptionValidationError::from_violations(violations)
    }
}

/// Validated create input.
///
/// Fields are private so that an instance always satisfies the create
/// constraints. Construct with [`NewPrescription::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrescription {
    appointment_id: i64,
    patient_id: i64,
    doctor_id: i64,
    medication: String,
    dosage: String,
    days: i64,
}

impl NewPrescription {
    /// Validates every field and returns a create-ready value.
    ///
    /// # Errors
    /// - Returns every violated field at once, in declaration order.
    pub fn new(
        appointment_id: i64,
        patient_id: i64,
        doctor_id: i64,
        medication: impl Into<String>,
        dosage: impl Into<String>,
        days: i64,
    ) -> Result<Self, PrescriptionValidationError> {
        let medication = medication.into();
        let dosage = dosage.into();
        let violations = collect_violations(
            appointment_id,
            patient_id,
            doctor_id,
            &medication,
            &dosage,
            days,
        );
        PrescriptionValidationError::from_violations(violations)?;

        Ok(Self {
            appointment_id,
            patient_id,
            doctor_id,
            medication,
            dosage,
            days,
        })
    }

    pub fn appointment_id(&self) -> i64 {
        self.appointment_id
    }

    pub fn patient_id(&self) -> i64 {
        self.patient_id
    }

    pub fn doctor_id(&self) -> i64 {
        self.doctor_id
    }

    pub fn medication(&self) -> &str {
        &self.medication
    }

    pub fn dosage(&self) -> &str {
        &self.dosage
    }

    pub fn days(&self) -> i64 {
        self.days
    }

    /// Builds the stored record once the store has assigned generated fields.
    pub fn into_prescription(
        self,
        prescription_id: PrescriptionId,
        issued_at: DateTime<Utc>,
    ) -> Prescription {
        Prescription {
            prescription_id,
            appointment_id: self.appointment_id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            medication: self.medication,
            dosage: self.dosage,
            days: self.days,
            issued_at,
        }
    }
}

/// Why a single field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationReason {
    /// Integer must be greater than zero.
    NotPositive,
    /// Text must contain at least one non-whitespace character.
    Blank,
    /// Integer exceeds the configured upper bound.
    AboveMaximum(u32),
}

impl Display for ViolationReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPositive => write!(f, "must be a positive integer"),
            Self::Blank => write!(f, "must not be empty"),
            Self::AboveMaximum(max) => write!(f, "must not exceed {max}"),
        }
    }
}

/// One rejected input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub reason: ViolationReason,
}

impl FieldViolation {
    pub fn new(field: &'static str, reason: ViolationReason) -> Self {
        Self { field, reason }
    }
}

impl Display for FieldViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.field, self.reason)
    }
}

/// Input rejected before reaching storage.
///
/// Always holds at least one violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescriptionValidationError {
    violations: Vec<FieldViolation>,
}

impl PrescriptionValidationError {
    /// Returns `Ok(())` for an empty list, otherwise an error holding it.
    pub fn from_violations(violations: Vec<FieldViolation>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self { violations })
        }
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Names of the offending fields, in the order they were checked.
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|violation| violation.field).collect()
    }
}

impl Display for PrescriptionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid prescription input: ")?;
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl Error for PrescriptionValidationError {}

/// Returns a violation when `value` is not greater than zero.
pub fn check_positive(field: &'static str, value: i64) -> Option<FieldViolation> {
    (value <= 0).then(|| FieldViolation::new(field, ViolationReason::NotPositive))
}

fn check_not_blank(field: &'static str, value: &str) -> Option<FieldViolation> {
    value
        .trim()
        .is_empty()
        .then(|| FieldViolation::new(field, ViolationReason::Blank))
}

fn collect_violations(
    appointment_id: i64,
    patient_id: i64,
    doctor_id: i64,
    medication: &str,
    dosage: &str,
    days: i64,
) -> Vec<FieldViolation> {
    [
        check_positive("appointment_id", appointment_id),
        check_positive("patient_id", patient_id),
        check_positive("doctor_id", doctor_id),
        check_not_blank("medication", medication),
        check_not_blank("dosage", dosage),
        check_positive("days", days),
    ]
    .into_iter()
    .flatten()
    .collect()
}
