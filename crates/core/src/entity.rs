//! Rows with a stable database identity.

/// A stored record addressed by its integer row id (patient, medicine,
/// order line).
///
/// Ids are assigned by SQLite on insert and never reused for another record.
pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> Self::Id;
}
