//! Prescription domain model.
//!
//! # Responsibility
//! - Define the canonical prescription record returned by every read path.
//! - Validate create input before any storage call is attempted.
//!
//! # Invariants
//! - A `NewPrescription` can only exist in a validated state.
//! - A `Prescription` is never mutated after creation.

pub mod prescription;
