//! Core use-case services.
//!
//! # Responsibility
//! - Turn raw request values into validated repository calls.
//! - Map repository outcomes onto the validation / not-found / storage
//!   taxonomy seen by callers.

pub mod prescription_service;
