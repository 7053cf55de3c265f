//! Transport-neutral request surface for the prescription service.
//!
//! Maps request bodies, query strings and path ids onto
//! `prescription_core` use-cases and returns status + JSON envelopes that
//! any HTTP layer can forward unchanged.

pub mod api;

pub use api::{health, ApiResponse, ListParams, PrescriptionApi};
