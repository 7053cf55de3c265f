//! Core domain logic for the prescription service.
//! This crate is the single source of truth for prescription invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, ServiceConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::prescription::{
    FieldViolation, NewPrescription, Prescription, PrescriptionId, PrescriptionValidationError,
    ViolationReason,
};
pub use repo::prescription_repo::{
    PrescriptionFilter, PrescriptionListQuery, PrescriptionRepository, RepoError, RepoResult,
    SqlitePrescriptionRepository,
};
pub use service::prescription_service::{
    CreatePrescriptionRequest, PageRequest, PrescriptionPage, PrescriptionService,
    PrescriptionServiceError, ServiceResult,
};

/// Service name reported by the liveness probe and startup logs.
pub const SERVICE_NAME: &str = "prescription-service";

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
