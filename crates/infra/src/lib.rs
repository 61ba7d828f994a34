//! Infrastructure layer: SQLite persistence, configuration, audit logging.
//!
//! Every store takes an explicit [`sqlx::SqlitePool`]; there is no global
//! connection. [`Clinic`] wires the stores together for a process.

pub mod audit;
pub mod clinic;
pub mod config;
pub mod db;
pub mod error;
pub mod locks;
pub mod medicines;
pub mod orders;
pub mod patients;

#[cfg(test)]
pub(crate) mod test_support;

pub use audit::{
    AuditEntry, AuditLog, AuditWorkerHandle, AuditWriter, InMemoryAuditWriter, SqliteAuditWriter,
};
pub use clinic::Clinic;
pub use config::{ClinicConfig, DatabaseConfig};
pub use error::{StoreError, StoreResult};
pub use locks::OrderLocks;
pub use medicines::MedicineCatalog;
pub use orders::OrderTransactionManager;
pub use patients::PatientResolver;
