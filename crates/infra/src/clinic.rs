//! Process-level wiring of the stores.

use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;
use tracing::info;

use crate::audit::{AuditLog, AuditWorkerHandle, SqliteAuditWriter};
use crate::config::ClinicConfig;
use crate::db;
use crate::medicines::MedicineCatalog;
use crate::orders::OrderTransactionManager;
use crate::patients::PatientResolver;

/// All stores sharing one pool and one audit queue.
#[derive(Debug)]
pub struct Clinic {
    pool: SqlitePool,
    audit: AuditLog,
    audit_worker: AuditWorkerHandle,
    orders: OrderTransactionManager,
    patients: PatientResolver,
    medicines: MedicineCatalog,
}

impl Clinic {
    /// Connect, apply the schema, optionally seed, and start the audit worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open(config: &ClinicConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config.database).await?;
        db::migrate(&pool).await?;
        if config.seed_sample_data {
            db::seed_sample_data(&pool).await?;
        }
        Self::with_pool(pool, config).await
    }

    /// Wire the stores onto an existing, migrated pool.
    pub async fn with_pool(pool: SqlitePool, config: &ClinicConfig) -> anyhow::Result<Self> {
        let (audit, audit_worker) = AuditLog::spawn(
            Arc::new(SqliteAuditWriter::new(pool.clone())),
            config.audit_queue_capacity,
        );

        let orders = OrderTransactionManager::new(pool.clone(), audit.clone())
            .with_status_policy(config.status_policy)
            .with_total_policy(config.total_policy);
        let patients = PatientResolver::new(pool.clone(), audit.clone());
        let medicines = MedicineCatalog::load(pool.clone(), audit.clone())
            .await
            .context("failed to load medicine catalog")?;

        info!(
            status_policy = ?config.status_policy,
            total_policy = ?config.total_policy,
            "clinic stores ready"
        );

        Ok(Self {
            pool,
            audit,
            audit_worker,
            orders,
            patients,
            medicines,
        })
    }

    pub fn orders(&self) -> &OrderTransactionManager {
        &self.orders
    }

    pub fn patients(&self) -> &PatientResolver {
        &self.patients
    }

    pub fn medicines(&self) -> &MedicineCatalog {
        &self.medicines
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Flush the audit queue and close the pool.
    pub async fn shutdown(self) {
        self.audit_worker.shutdown().await;
        self.pool.close().await;
        info!("clinic stores shut down");
    }
}
