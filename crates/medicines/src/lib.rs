//! Medicine catalog domain module.
//!
//! Catalog entries, write payload validation, the structured search filter,
//! and the adapter that lets catalog entries take part in fuzzy lookup.

pub mod medicine;

pub use medicine::{IndexedMedicine, MedicineEntry, MedicineSearch, NewMedicine};
