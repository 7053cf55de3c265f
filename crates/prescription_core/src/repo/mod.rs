//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the persistence contract for prescriptions.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Writes only accept `NewPrescription`, which is validated on construction.
//! - Read paths reject persisted rows that fail `Prescription::validate()`.

pub mod prescription_repo;
