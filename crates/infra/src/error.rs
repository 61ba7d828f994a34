//! Store error taxonomy surfaced to callers.
//!
//! | SQLx error | StoreError |
//! |------------|------------|
//! | Database (unique violation) | `Conflict` |
//! | Database (other) | `Persistence` |
//! | PoolClosed / RowNotFound / other | `Persistence` |

use serde_json::json;
use thiserror::Error;

use clinicdesk_core::DomainError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected before any transaction was opened.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Version mismatch or uniqueness race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Statement or transaction failure. The transaction was rolled back.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl StoreError {
    /// Stable category code for responses.
    pub fn category(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "validation_error",
            StoreError::NotFound(_) => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::Persistence(_) => "persistence_error",
        }
    }

    /// User-facing message without internal diagnostic detail.
    ///
    /// Validation messages describe the caller's own payload and are passed
    /// through; everything else is replaced by a fixed message.
    pub fn public_message(&self) -> String {
        match self {
            StoreError::Validation(msg) => msg.clone(),
            StoreError::NotFound(entity) => format!("{entity} not found"),
            StoreError::Conflict(_) => {
                "the record was changed by another request; reload and try again".to_string()
            }
            StoreError::Persistence(_) => "the operation could not be completed".to_string(),
        }
    }

    /// `{"error": code, "message": msg}`
    pub fn public_body(&self) -> serde_json::Value {
        json!({
            "error": self.category(),
            "message": self.public_message(),
        })
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                StoreError::Validation(msg)
            }
            DomainError::NotFound(kind) => StoreError::NotFound(kind),
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
        }
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.is_unique_violation() {
                StoreError::Conflict(msg)
            } else {
                StoreError::Persistence(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Persistence(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Persistence(format!("unexpected missing row in {operation}"))
        }
        other => StoreError::Persistence(format!("{operation} failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_stable() {
        assert_eq!(StoreError::Validation("x".into()).category(), "validation_error");
        assert_eq!(StoreError::NotFound("order").category(), "not_found");
        assert_eq!(StoreError::Conflict("x".into()).category(), "conflict");
        assert_eq!(StoreError::Persistence("x".into()).category(), "persistence_error");
    }

    #[test]
    fn public_body_hides_internal_detail() {
        let err = StoreError::Persistence("database error in insert_line_item: disk I/O".into());
        let body = err.public_body();
        assert_eq!(body["error"], "persistence_error");
        assert!(!body["message"].as_str().unwrap().contains("disk"));

        let err = StoreError::NotFound("order");
        assert_eq!(err.public_body()["message"], "order not found");
    }

    #[test]
    fn domain_errors_map_onto_store_errors() {
        assert!(matches!(
            StoreError::from(DomainError::validation("bad")),
            StoreError::Validation(m) if m == "bad"
        ));
        assert!(matches!(
            StoreError::from(DomainError::conflict("stale")),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            StoreError::from(DomainError::invalid_id("x")),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            StoreError::from(DomainError::not_found("patient")),
            StoreError::NotFound("patient")
        ));
    }

    #[test]
    fn pool_closed_is_persistence() {
        let err = map_sqlx_error("begin_transaction", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Persistence(m) if m.contains("begin_transaction")));
    }
}
