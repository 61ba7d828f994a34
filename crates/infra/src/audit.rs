//! Best-effort operation log.
//!
//! Mutations enqueue an [`AuditEntry`] on a bounded queue; one worker task
//! drains it into an [`AuditWriter`]. Recording never blocks and never fails
//! the caller: when the queue is full or closed the entry is dropped and
//! counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use clinicdesk_core::ClinicianId;

use crate::error::{map_sqlx_error, StoreResult};

/// One operation log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub actor_id: Option<ClinicianId>,
    pub module: &'static str,
    pub action: &'static str,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(module: &'static str, action: &'static str, description: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            module,
            action,
            description: description.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor: ClinicianId) -> Self {
        self.actor_id = Some(actor);
        self
    }
}

/// Destination for drained audit entries.
#[async_trait]
pub trait AuditWriter: Send + Sync + 'static {
    async fn write(&self, entry: &AuditEntry) -> StoreResult<()>;
}

/// Writes entries into the `operation_logs` table.
#[derive(Debug, Clone)]
pub struct SqliteAuditWriter {
    pool: SqlitePool,
}

impl SqliteAuditWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditWriter for SqliteAuditWriter {
    async fn write(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO operation_logs (actor_id, action, module, description, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.actor_id.map(|id| id.get()))
        .bind(entry.action)
        .bind(entry.module)
        .bind(&entry.description)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_operation_log", e))?;
        Ok(())
    }
}

/// In-memory writer for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditWriter {
    inner: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditWriter for InMemoryAuditWriter {
    async fn write(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AuditCounters {
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Producer side of the audit queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditLog {
    sender: mpsc::Sender<AuditEntry>,
    counters: Arc<AuditCounters>,
}

/// Owner handle for the worker task.
#[derive(Debug)]
pub struct AuditWorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl AuditLog {
    /// Start the worker on the current Tokio runtime.
    ///
    /// `capacity` is clamped to at least 1.
    pub fn spawn<W: AuditWriter>(writer: Arc<W>, capacity: usize) -> (Self, AuditWorkerHandle) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let counters = Arc::new(AuditCounters::default());

        let join = tokio::spawn(worker_loop(writer, receiver, shutdown_rx, counters.clone()));

        (
            Self { sender, counters },
            AuditWorkerHandle {
                shutdown: shutdown_tx,
                join,
            },
        )
    }

    /// Enqueue `entry` without waiting.
    pub fn record(&self, entry: AuditEntry) {
        match self.sender.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    module = entry.module,
                    action = entry.action,
                    "audit queue full; entry dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    module = entry.module,
                    action = entry.action,
                    "audit queue closed; entry dropped"
                );
            }
        }
    }

    pub fn written(&self) -> u64 {
        self.counters.written.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }
}

impl AuditWorkerHandle {
    /// Close the queue, write what is already queued, and wait for the worker.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.join.await {
            warn!(error = %err, "audit worker terminated abnormally");
        }
    }
}

async fn worker_loop<W: AuditWriter>(
    writer: Arc<W>,
    mut receiver: mpsc::Receiver<AuditEntry>,
    mut shutdown: oneshot::Receiver<()>,
    counters: Arc<AuditCounters>,
) {
    loop {
        tokio::select! {
            biased;
            next = receiver.recv() => match next {
                Some(entry) => write_entry(writer.as_ref(), &entry, &counters).await,
                None => break,
            },
            // A dropped handle counts as a shutdown request.
            _ = &mut shutdown => {
                receiver.close();
                while let Some(entry) = receiver.recv().await {
                    write_entry(writer.as_ref(), &entry, &counters).await;
                }
                break;
            }
        }
    }
    debug!("audit worker stopped");
}

async fn write_entry<W: AuditWriter>(writer: &W, entry: &AuditEntry, counters: &AuditCounters) {
    match writer.write(entry).await {
        Ok(()) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                module = entry.module,
                action = entry.action,
                error = %err,
                "failed to write audit entry"
            );
        }
    }
}
