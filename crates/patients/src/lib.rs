//! Patients domain module.
//!
//! Patient records, their demographics, and the name rules that the resolver
//! and the fuzzy patient search rely on. Pure domain logic (no IO, no storage).

pub mod patient;

pub use patient::{Demographics, NewPatient, Patient, PatientCandidate, MAX_NAME_CHARS};
