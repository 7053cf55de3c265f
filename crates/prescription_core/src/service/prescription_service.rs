//! Prescription use-case service.
//!
//! # Responsibility
//! - Provide create/get/list entry points for the prescription store.
//! - Validate pagination and filter input before querying.
//! - Emit metadata-only events for every operation.
//!
//! # Invariants
//! - Service APIs never bypass `NewPrescription` validation.
//! - `page` is 1-based; a page past the end yields no items, not an error.
//! - Log records carry ids and counts only, never medication or dosage text.

use crate::model::prescription::{
    check_positive, FieldViolation, NewPrescription, Prescription, PrescriptionId,
    PrescriptionValidationError, ViolationReason,
};
use crate::repo::prescription_repo::{
    PrescriptionFilter, PrescriptionListQuery, PrescriptionRepository, RepoError,
};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Page returned when the caller does not ask for one.
pub const DEFAULT_PAGE: i64 = 1;
/// Page size used when the caller does not pass one.
pub const DEFAULT_PAGE_SIZE: i64 = 100;
/// Upper bound for `page_size` unless configured otherwise.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Errors surfaced by prescription use-cases.
#[derive(Debug)]
pub enum PrescriptionServiceError {
    /// Input violated one or more field constraints.
    Validation(PrescriptionValidationError),
    /// No prescription exists for the id.
    NotFound(PrescriptionId),
    /// Persistence failure; detail is for logs, not for callers.
    Storage(RepoError),
}

impl Display for PrescriptionServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "prescription not found: {id}"),
            Self::Storage(err) => write!(f, "prescription storage failure: {err}"),
        }
    }
}

impl Error for PrescriptionServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::NotFound(_) => None,
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<PrescriptionValidationError> for PrescriptionServiceError {
    fn from(value: PrescriptionValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for PrescriptionServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, PrescriptionServiceError>;

/// Raw create input as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrescriptionRequest {
    pub appointment_id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub medication: String,
    pub dosage: String,
    pub days: i64,
}

/// Raw pagination input; `None` falls back to the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// One page of a filtered listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescriptionPage {
    /// Items ordered by `prescription_id ASC`.
    pub items: Vec<Prescription>,
    /// Number of records matching the filter across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Prescription service facade over repository implementations.
pub struct PrescriptionService<R: PrescriptionRepository> {
    repo: R,
    max_page_size: u32,
}

impl<R: PrescriptionRepository> PrescriptionService<R> {
    /// Creates a service with the default page size bound.
    pub fn new(repo: R) -> Self {
        Self::with_max_page_size(repo, DEFAULT_MAX_PAGE_SIZE)
    }

    /// Creates a service with a custom page size bound.
    ///
    /// A bound of zero is raised to one so that some page size stays valid.
    /// Requests without `page_size` use the smaller of `DEFAULT_PAGE_SIZE`
    /// and this bound.
    pub fn with_max_page_size(repo: R, max_page_size: u32) -> Self {
        Self {
            repo,
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// Validates and persists one prescription.
    ///
    /// # Errors
    /// - `Validation` listing every offending field.
    /// - `Storage` when the insert fails.
    pub fn create(&self, request: CreatePrescriptionRequest) -> ServiceResult<Prescription> {
        let input = match NewPrescription::new(
            request.appointment_id,
            request.patient_id,
            request.doctor_id,
            request.medication,
            request.dosage,
            request.days,
        ) {
            Ok(input) => input,
            Err(err) => {
                warn!(
                    "event=prescription_create module=service status=rejected fields={}",
                    err.fields().join(",")
                );
                return Err(err.into());
            }
        };

        match self.repo.create_prescription(&input) {
            Ok(prescription) => {
                info!(
                    "event=prescription_created module=service status=ok prescription_id={} appointment_id={}",
                    prescription.prescription_id, prescription.appointment_id
                );
                Ok(prescription)
            }
            Err(err) => {
                error!(
                    "event=prescription_create module=service status=error error_code=storage_failed error={err}"
                );
                Err(err.into())
            }
        }
    }

    /// Returns the stored record for `id`.
    ///
    /// # Errors
    /// - `NotFound` carrying `id` when no record exists.
    pub fn get(&self, id: PrescriptionId) -> ServiceResult<Prescription> {
        match self.repo.get_prescription(id) {
            Ok(Some(prescription)) => Ok(prescription),
            Ok(None) => Err(PrescriptionServiceError::NotFound(id)),
            Err(err) => {
                error!(
                    "event=prescription_get module=service status=error prescription_id={id} error_code=storage_failed error={err}"
                );
                Err(err.into())
            }
        }
    }

    /// Lists one page of prescriptions matching `filter`.
    ///
    /// # Errors
    /// - `Validation` when a filter id is not positive, `page` is outside
    ///   `1..=u32::MAX`, or `page_size` is outside `1..=max_page_size`.
    pub fn list(
        &self,
        filter: PrescriptionFilter,
        page: PageRequest,
    ) -> ServiceResult<PrescriptionPage> {
        let (page_number, page_size) =
            self.validate_list_input(&filter, page).map_err(|err| {
                warn!(
                    "event=prescriptions_retrieved module=service status=rejected fields={}",
                    err.fields().join(",")
                );
                err
            })?;
        let query = PrescriptionListQuery {
            filter,
            limit: Some(page_size),
            offset: u64::from(page_number - 1) * u64::from(page_size),
        };

        let (total, items) = self.repo.list_page(&query).map_err(|err| {
            error!(
                "event=prescriptions_retrieved module=service status=error error_code=storage_failed error={err}"
            );
            PrescriptionServiceError::from(err)
        })?;

        info!(
            "event=prescriptions_retrieved module=service status=ok total={total} returned={} page={page_number} page_size={page_size}",
            items.len()
        );
        Ok(PrescriptionPage {
            items,
            total,
            page: page_number,
            page_size,
        })
    }

    fn validate_list_input(
        &self,
        filter: &PrescriptionFilter,
        page: PageRequest,
    ) -> Result<(u32, u32), PrescriptionValidationError> {
        let page_number = page.page.unwrap_or(DEFAULT_PAGE);
        let page_size = page
            .page_size
            .unwrap_or_else(|| DEFAULT_PAGE_SIZE.min(i64::from(self.max_page_size)));

        let mut violations: Vec<FieldViolation> = [
            filter
                .patient_id
                .and_then(|value| check_positive("patient_id", value)),
            filter
                .appointment_id
                .and_then(|value| check_positive("appointment_id", value)),
        ]
        .into_iter()
        .flatten()
        .collect();

        let page_number = bounded_u32("page", page_number, u32::MAX, &mut violations);
        let page_size = bounded_u32("page_size", page_size, self.max_page_size, &mut violations);

        PrescriptionValidationError::from_violations(violations)?;
        Ok((page_number, page_size))
    }
}

/// Converts `value` into `1..=max`, recording a violation and returning 0
/// when it falls outside.
fn bounded_u32(
    field: &'static str,
    value: i64,
    max: u32,
    violations: &mut Vec<FieldViolation>,
) -> u32 {
    if let Some(violation) = check_positive(field, value) {
        violations.push(violation);
        return 0;
    }
    match u32::try_from(value) {
        Ok(bounded) if bounded <= max => bounded,
        _ => {
            violations.push(FieldViolation::new(
                field,
                ViolationReason::AboveMaximum(max),
            ));
            0
        }
    }
}
