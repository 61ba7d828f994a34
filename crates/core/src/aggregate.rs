//! Aggregate root trait and optimistic concurrency expectations.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
///
/// An aggregate is written as one unit (a clinical order and its line items).
/// `version()` increases on every committed write of the aggregate.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> Self::Id;

    /// Monotonically increasing version of the aggregate's stored state.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate write.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// Skip version checking (last writer wins).
    #[default]
    Any,
    /// Require the aggregate to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

impl From<Option<u64>> for ExpectedVersion {
    fn from(value: Option<u64>) -> Self {
        value.map_or(ExpectedVersion::Any, ExpectedVersion::Exact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_every_version() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(99));
    }

    #[test]
    fn exact_mismatch_is_conflict() {
        assert!(ExpectedVersion::Exact(3).check(3).is_ok());
        match ExpectedVersion::Exact(3).check(4) {
            Err(DomainError::Conflict(msg)) => assert!(msg.contains("actual: 4")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn optional_version_maps_to_expectation() {
        assert_eq!(ExpectedVersion::from(None), ExpectedVersion::Any);
        assert_eq!(ExpectedVersion::from(Some(2)), ExpectedVersion::Exact(2));
    }
}
