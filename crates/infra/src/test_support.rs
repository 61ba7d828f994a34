//! Shared fixtures for the infra tests.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::audit::{AuditLog, AuditWorkerHandle, InMemoryAuditWriter};
use crate::db;

/// Migrated in-memory database.
///
/// Every SQLite connection to `:memory:` is its own database, so the pool is
/// pinned to one connection that never expires.
pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid in-memory url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("in-memory pool");
    db::migrate(&pool).await.expect("schema applies");
    pool
}

pub(crate) struct TestAudit {
    pub log: AuditLog,
    pub worker: AuditWorkerHandle,
    pub writer: Arc<InMemoryAuditWriter>,
}

pub(crate) fn test_audit() -> TestAudit {
    let writer = Arc::new(InMemoryAuditWriter::new());
    let (log, worker) = AuditLog::spawn(writer.clone(), 64);
    TestAudit { log, worker, writer }
}

/// Install a trigger that aborts any line insert for a medicine named `POISON`.
pub(crate) async fn poison_line_inserts(pool: &SqlitePool) {
    sqlx::query(
        r#"
        CREATE TRIGGER poison_line_insert
        BEFORE INSERT ON prescription_items
        WHEN NEW.medicine_name = 'POISON'
        BEGIN
            SELECT RAISE(ABORT, 'simulated line insert failure');
        END
        "#,
    )
    .execute(pool)
    .await
    .expect("trigger installs");
}

/// Install a trigger that aborts every header delete.
pub(crate) async fn block_order_deletes(pool: &SqlitePool) {
    sqlx::query(
        r#"
        CREATE TRIGGER block_order_delete
        BEFORE DELETE ON prescriptions
        BEGIN
            SELECT RAISE(ABORT, 'simulated header delete failure');
        END
        "#,
    )
    .execute(pool)
    .await
    .expect("trigger installs");
}

pub(crate) async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count query")
}
