//! Domain error model.

use thiserror::Error;

/// Result type used across the domain crates.
pub type DomainResult<T> = Result<T, DomainError>;

/// Failures decided by domain rules alone, before any storage is touched.
///
/// Storage failures are reported by the infra layer's own error type, which
/// converts from this one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A payload field failed validation. The message names the field and is
    /// safe to show to the caller.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A row id was malformed or not positive.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The named kind of record does not exist (`"order"`, `"patient"`).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Stale version or a state that changed underneath the caller.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(kind: &'static str) -> Self {
        Self::NotFound(kind)
    }

    /// True for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidId(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_record_kind() {
        assert_eq!(DomainError::not_found("order").to_string(), "order not found");
    }

    #[test]
    fn client_errors_are_validation_and_ids() {
        assert!(DomainError::validation("x").is_client_error());
        assert!(DomainError::invalid_id("x").is_client_error());
        assert!(!DomainError::conflict("x").is_client_error());
        assert!(!DomainError::not_found("patient").is_client_error());
    }
}
