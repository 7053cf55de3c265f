//! Request handlers for the prescription endpoints.
//!
//! # Responsibility
//! - Decode JSON bodies, query strings and path ids.
//! - Run one store operation per request on its own connection.
//! - Encode outcomes as status codes and JSON bodies.
//!
//! # Invariants
//! - Handlers never panic; every failure becomes an `ApiResponse`.
//! - Validation failures list the offending fields (422).
//! - Not-found failures carry only the missing id (404).
//! - Storage failures are logged in full and returned as an opaque 500.

use log::{error, info};
use prescription_core::db::open_db;
use prescription_core::{
    CreatePrescriptionRequest, PageRequest, Prescription, PrescriptionFilter, PrescriptionService,
    PrescriptionServiceError, PrescriptionValidationError, ServiceConfig, ServiceResult,
    SqlitePrescriptionRepository, SERVICE_NAME,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_UNPROCESSABLE: u16 = 422;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Status plus JSON body produced by one handler call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    /// Total matches for list responses, for an `X-Total-Count` style header.
    pub total_count: Option<u64>,
}

impl ApiResponse {
    fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            total_count: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn validation(fields: Vec<FieldError>) -> Self {
        Self::new(
            STATUS_UNPROCESSABLE,
            json!({ "error": "validation_error", "fields": fields }),
        )
    }

    fn from_service_error(operation: &'static str, err: PrescriptionServiceError) -> Self {
        match err {
            PrescriptionServiceError::Validation(err) => Self::validation(field_errors(&err)),
            PrescriptionServiceError::NotFound(id) => Self::new(
                STATUS_NOT_FOUND,
                json!({ "error": "not_found", "prescription_id": id }),
            ),
            PrescriptionServiceError::Storage(err) => {
                error!(
                    "event=request module=api operation={operation} status=error error_code=storage_failed error={err}"
                );
                Self::internal_error()
            }
        }
    }

    fn internal_error() -> Self {
        Self::new(STATUS_INTERNAL_ERROR, json!({ "error": "internal_error" }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Body of `POST /v1/prescriptions`. Every field is required.
#[derive(Debug, Deserialize)]
struct CreatePrescriptionBody {
    appointment_id: i64,
    patient_id: i64,
    doctor_id: i64,
    medication: String,
    dosage: String,
    days: i64,
}

/// Raw query parameters of `GET /v1/prescriptions`.
///
/// Values stay textual so that non-integer input is reported per field.
/// Empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListParams {
    pub patient_id: Option<String>,
    pub appointment_id: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

/// Liveness probe body for `GET /health`.
pub fn health() -> ApiResponse {
    ApiResponse::new(
        STATUS_OK,
        json!({ "status": "healthy", "service": SERVICE_NAME }),
    )
}

/// Request handlers bound to one SQLite database file.
#[derive(Debug, Clone)]
pub struct PrescriptionApi {
    database_path: PathBuf,
    max_page_size: u32,
}

impl PrescriptionApi {
    pub fn new(database_path: impl Into<PathBuf>, max_page_size: u32) -> Self {
        Self {
            database_path: database_path.into(),
            max_page_size,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.database_path.clone(), config.max_page_size)
    }

    /// Handles `POST /v1/prescriptions`: 201 with the created record.
    pub fn create_prescription(&self, body: &str) -> ApiResponse {
        let body: CreatePrescriptionBody = match serde_json::from_str(body) {
            Ok(body) => body,
            Err(err) => {
                return ApiResponse::validation(vec![FieldError::new("body", err.to_string())]);
            }
        };
        let request = CreatePrescriptionRequest {
            appointment_id: body.appointment_id,
            patient_id: body.patient_id,
            doctor_id: body.doctor_id,
            medication: body.medication,
            dosage: body.dosage,
            days: body.days,
        };

        match self.with_service(|service| service.create(request)) {
            Ok(Ok(prescription)) => {
                respond_with_record("create_prescription", STATUS_CREATED, &prescription)
            }
            Ok(Err(err)) => ApiResponse::from_service_error("create_prescription", err),
            Err(response) => response,
        }
    }

    /// Handles `GET /v1/prescriptions?<query>`: 200 with an ordered array.
    pub fn list_prescriptions(&self, query: &str) -> ApiResponse {
        match serde_urlencoded::from_str::<ListParams>(query.trim_start_matches('?')) {
            Ok(params) => self.list_prescriptions_with(&params),
            Err(err) => ApiResponse::validation(vec![FieldError::new("query", err.to_string())]),
        }
    }

    /// Same as [`Self::list_prescriptions`] for already-decoded parameters.
    pub fn list_prescriptions_with(&self, params: &ListParams) -> ApiResponse {
        let mut field_errors = Vec::new();
        let mut parse = |field: &'static str, raw: &Option<String>| -> Option<i64> {
            let value = raw.as_deref().map(str::trim).filter(|value| !value.is_empty())?;
            match value.parse::<i64>() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    field_errors.push(FieldError::new(field, "must be an integer"));
                    None
                }
            }
        };

        let filter = PrescriptionFilter {
            patient_id: parse("patient_id", &params.patient_id),
            appointment_id: parse("appointment_id", &params.appointment_id),
        };
        let page = PageRequest {
            page: parse("page", &params.page),
            page_size: parse("page_size", &params.page_size),
        };
        if !field_errors.is_empty() {
            return ApiResponse::validation(field_errors);
        }

        match self.with_service(|service| service.list(filter, page)) {
            Ok(Ok(page)) => match serde_json::to_value(&page.items) {
                Ok(body) => ApiResponse {
                    status: STATUS_OK,
                    body,
                    total_count: Some(page.total),
                },
                Err(err) => encode_failure("list_prescriptions", &err),
            },
            Ok(Err(err)) => ApiResponse::from_service_error("list_prescriptions", err),
            Err(response) => response,
        }
    }

    /// Handles `GET /v1/prescriptions/{prescription_id}`.
    pub fn get_prescription(&self, raw_id: &str) -> ApiResponse {
        let Ok(id) = raw_id.trim().parse::<i64>() else {
            return ApiResponse::validation(vec![FieldError::new(
                "prescription_id",
                "must be an integer",
            )]);
        };

        match self.with_service(|service| service.get(id)) {
            Ok(Ok(prescription)) => {
                respond_with_record("get_prescription", STATUS_OK, &prescription)
            }
            Ok(Err(err)) => ApiResponse::from_service_error("get_prescription", err),
            Err(response) => response,
        }
    }

    /// Opens a connection for one unit of work and runs `f` against it.
    ///
    /// The outer `Err` is an already-encoded 500 for bootstrap failures.
    fn with_service<T>(
        &self,
        f: impl FnOnce(&PrescriptionService<SqlitePrescriptionRepository<'_>>) -> ServiceResult<T>,
    ) -> Result<ServiceResult<T>, ApiResponse> {
        let conn = open_db(&self.database_path).map_err(|err| {
            error!("event=request module=api status=error error_code=db_open_failed error={err}");
            ApiResponse::internal_error()
        })?;
        let repo = SqlitePrescriptionRepository::try_new(&conn).map_err(|err| {
            error!("event=request module=api status=error error_code=repo_init_failed error={err}");
            ApiResponse::internal_error()
        })?;
        let service = PrescriptionService::with_max_page_size(repo, self.max_page_size);
        Ok(f(&service))
    }
}

fn respond_with_record(
    operation: &'static str,
    status: u16,
    record: &Prescription,
) -> ApiResponse {
    match serde_json::to_value(record) {
        Ok(body) => {
            info!(
                "event=request module=api operation={operation} status=ok http_status={status} prescription_id={}",
                record.prescription_id
            );
            ApiResponse::new(status, body)
        }
        Err(err) => encode_failure(operation, &err),
    }
}

fn encode_failure(operation: &'static str, err: &serde_json::Error) -> ApiResponse {
    error!(
        "event=request module=api operation={operation} status=error error_code=encode_failed error={err}"
    );
    ApiResponse::internal_error()
}

fn field_errors(err: &PrescriptionValidationError) -> Vec<FieldError> {
    err.violations()
        .iter()
        .map(|violation| FieldError::new(violation.field, violation.reason.to_string()))
        .collect()
}
