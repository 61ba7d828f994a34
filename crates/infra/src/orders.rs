//! Transactional persistence for clinical orders.
//!
//! An order is a header row in `prescriptions` plus its rows in
//! `prescription_items`. Every multi-statement write runs in one
//! `sqlx::Transaction`; any exit path that does not reach `commit` rolls the
//! transaction back when it is dropped, so no partial order is ever visible.
//!
//! Writes to an existing order also hold that order's in-process lock
//! ([`OrderLocks`]) and, when the payload carries a `version`, are
//! conditional on it.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, instrument, warn, Span};

use clinicdesk_core::{ClinicianId, ExpectedVersion, LineItemId, MedicineId, OrderId, PatientId};
use clinicdesk_prescriptions::{
    ClinicalOrder, LineItemDraft, OrderDetails, OrderDraft, OrderLineItem, OrderStatus,
    StatusPolicy, TotalCheck, TotalPolicy,
};

use crate::audit::{AuditEntry, AuditLog};
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::locks::OrderLocks;

const AUDIT_MODULE: &str = "prescription";

#[derive(Debug, Clone)]
pub struct OrderTransactionManager {
    pool: SqlitePool,
    locks: OrderLocks,
    audit: AuditLog,
    status_policy: StatusPolicy,
    total_policy: TotalPolicy,
}

impl OrderTransactionManager {
    pub fn new(pool: SqlitePool, audit: AuditLog) -> Self {
        Self {
            pool,
            locks: OrderLocks::new(),
            audit,
            status_policy: StatusPolicy::default(),
            total_policy: TotalPolicy::default(),
        }
    }

    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    pub fn with_total_policy(mut self, policy: TotalPolicy) -> Self {
        self.total_policy = policy;
        self
    }

    pub fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    pub fn total_policy(&self) -> TotalPolicy {
        self.total_policy
    }

    /// Insert a new order (status `draft`, version 1) with all of its lines.
    #[instrument(
        skip(self, draft),
        fields(
            clinician_id = %clinician_id,
            patient_id = %draft.patient_id,
            line_count = draft.items.len(),
            order_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn create(
        &self,
        clinician_id: ClinicianId,
        draft: &OrderDraft,
    ) -> StoreResult<OrderId> {
        draft.validate_issued_by(clinician_id)?;
        self.check_total(draft)?;

        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let raw_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO prescriptions (
                patient_id, clinician_id, diagnosis, doctor_advice, total_amount,
                status, notes, version, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            RETURNING id
            "#,
        )
        .bind(draft.patient_id.get())
        .bind(clinician_id.get())
        .bind(&draft.diagnosis)
        .bind(&draft.doctor_advice)
        .bind(draft.total_amount)
        .bind(OrderStatus::Draft.as_str())
        .bind(&draft.notes)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        let order_id = OrderId::new(raw_id);
        insert_lines(&mut tx, order_id, &draft.items).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("order_id", raw_id);
        info!(order_id = %order_id, "order created");
        self.audit.record(
            AuditEntry::new(AUDIT_MODULE, "create", format!("created order {order_id}"))
                .with_actor(clinician_id),
        );
        Ok(order_id)
    }

    /// Header, display names, and lines in insertion order.
    ///
    /// Header and lines are read inside one transaction so they come from the
    /// same committed state.
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn get(&self, id: OrderId) -> StoreResult<OrderDetails> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            r#"
            SELECT
                o.id,
                o.patient_id,
                o.clinician_id,
                o.diagnosis,
                o.doctor_advice,
                o.total_amount,
                o.status,
                o.notes,
                o.version,
                o.created_at,
                o.updated_at,
                p.name AS patient_name,
                c.name AS clinician_name
            FROM prescriptions o
            LEFT JOIN patients p ON p.id = o.patient_id
            LEFT JOIN clinicians c ON c.id = o.clinician_id
            WHERE o.id = ?
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_order", e))?
        .ok_or(StoreError::NotFound("order"))?;

        let header = OrderRow::from_row(&row).map_err(|e| map_sqlx_error("decode_order", e))?;

        let item_rows = sqlx::query(
            r#"
            SELECT
                id,
                prescription_id,
                medicine_id,
                medicine_name,
                specification,
                dosage,
                usage,
                frequency,
                days,
                quantity,
                unit_price,
                total_price
            FROM prescription_items
            WHERE prescription_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(id.get())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_line_items", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let items = item_rows
            .iter()
            .map(|row| LineItemRow::from_row(row).map(OrderLineItem::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("decode_line_item", e))?;

        Ok(header.into_details(items))
    }

    /// Replace the header fields and the full line set. Returns the new version.
    ///
    /// The patient and clinician of an existing order are not changed.
    #[instrument(
        skip(self, draft),
        fields(order_id = %id, line_count = draft.items.len(), expected_version = ?draft.version),
        err
    )]
    pub async fn update(&self, id: OrderId, draft: &OrderDraft) -> StoreResult<u64> {
        draft.validate()?;
        self.check_total(draft)?;
        let expected = draft.expected_version();

        let _guard = self.locks.acquire(id).await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let now = Utc::now();
        let new_version: Option<i64> = match expected {
            ExpectedVersion::Any => sqlx::query_scalar::<_, i64>(
                r#"
                UPDATE prescriptions
                SET diagnosis = ?, doctor_advice = ?, total_amount = ?, notes = ?,
                    updated_at = ?, version = version + 1
                WHERE id = ?
                RETURNING version
                "#,
            )
            .bind(&draft.diagnosis)
            .bind(&draft.doctor_advice)
            .bind(draft.total_amount)
            .bind(&draft.notes)
            .bind(now)
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await,
            ExpectedVersion::Exact(version) => sqlx::query_scalar::<_, i64>(
                r#"
                UPDATE prescriptions
                SET diagnosis = ?, doctor_advice = ?, total_amount = ?, notes = ?,
                    updated_at = ?, version = version + 1
                WHERE id = ? AND version = ?
                RETURNING version
                "#,
            )
            .bind(&draft.diagnosis)
            .bind(&draft.doctor_advice)
            .bind(draft.total_amount)
            .bind(&draft.notes)
            .bind(now)
            .bind(id.get())
            .bind(version_to_db(version))
            .fetch_optional(&mut *tx)
            .await,
        }
        .map_err(|e| map_sqlx_error("update_order", e))?;

        let Some(new_version) = new_version else {
            return Err(missing_or_stale(&mut tx, id, expected).await);
        };

        sqlx::query("DELETE FROM prescription_items WHERE prescription_id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_line_items", e))?;

        insert_lines(&mut tx, id, &draft.items).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let new_version = version_from_db(new_version);
        info!(order_id = %id, version = new_version, "order updated");
        self.audit.record(AuditEntry::new(
            AUDIT_MODULE,
            "update",
            format!("updated order {id} to version {new_version}"),
        ));
        Ok(new_version)
    }

    /// Remove the order and all of its lines.
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn delete(&self, id: OrderId) -> StoreResult<()> {
        let _guard = self.locks.acquire(id).await;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let lines = sqlx::query("DELETE FROM prescription_items WHERE prescription_id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_line_items", e))?;

        let header = sqlx::query("DELETE FROM prescriptions WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;

        if header.rows_affected() == 0 {
            return Err(StoreError::NotFound("order"));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(order_id = %id, lines = lines.rows_affected(), "order deleted");
        self.audit.record(AuditEntry::new(
            AUDIT_MODULE,
            "delete",
            format!("deleted order {id}"),
        ));
        Ok(())
    }

    /// Set the order status according to the configured [`StatusPolicy`].
    #[instrument(skip(self), fields(order_id = %id, policy = ?self.status_policy), err)]
    pub async fn update_status(&self, id: OrderId, status: &str) -> StoreResult<()> {
        let target = self.status_policy.normalize_target(status)?;
        let _guard = self.locks.acquire(id).await;
        let now = Utc::now();

        if self.status_policy.requires_current() {
            let current: String =
                sqlx::query_scalar("SELECT status FROM prescriptions WHERE id = ?")
                    .bind(id.get())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("load_order_status", e))?
                    .ok_or(StoreError::NotFound("order"))?;

            self.status_policy.check_transition(&current, &target)?;

            // Conditional on the status just read.
            let result = sqlx::query(
                r#"
                UPDATE prescriptions
                SET status = ?, updated_at = ?, version = version + 1
                WHERE id = ? AND status = ?
                "#,
            )
            .bind(&target)
            .bind(now)
            .bind(id.get())
            .bind(&current)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_order_status", e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!(
                    "status of order {id} changed concurrently"
                )));
            }
        } else {
            let result = sqlx::query(
                r#"
                UPDATE prescriptions
                SET status = ?, updated_at = ?, version = version + 1
                WHERE id = ?
                "#,
            )
            .bind(&target)
            .bind(now)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_order_status", e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("order"));
            }
        }

        info!(order_id = %id, status = %target, "order status changed");
        self.audit.record(AuditEntry::new(
            AUDIT_MODULE,
            "status",
            format!("order {id} status set to {target}"),
        ));
        Ok(())
    }

    fn check_total(&self, draft: &OrderDraft) -> StoreResult<()> {
        match self.total_policy.check(draft.total_amount, draft.computed_total())? {
            TotalCheck::Consistent => {}
            TotalCheck::Mismatch {
                declared_cents,
                computed_cents,
            } => {
                warn!(
                    declared_cents,
                    computed_cents, "order total does not match the sum of its lines"
                );
            }
        }
        Ok(())
    }
}

async fn insert_lines(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: OrderId,
    items: &[LineItemDraft],
) -> StoreResult<()> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO prescription_items (
                prescription_id, medicine_id, medicine_name, specification, dosage,
                usage, frequency, days, quantity, unit_price, total_price
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order_id.get())
        .bind(item.medicine_id.map(|id| id.get()))
        .bind(item.medicine_name.trim())
        .bind(&item.specification)
        .bind(&item.dosage)
        .bind(&item.usage)
        .bind(&item.frequency)
        .bind(item.days)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_line_item", e))?;
    }
    debug!(order_id = %order_id, count = items.len(), "line items inserted");
    Ok(())
}

/// Explain a header update that matched no row.
async fn missing_or_stale(
    tx: &mut Transaction<'_, Sqlite>,
    id: OrderId,
    expected: ExpectedVersion,
) -> StoreError {
    let current: Result<Option<i64>, sqlx::Error> =
        sqlx::query_scalar("SELECT version FROM prescriptions WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&mut **tx)
            .await;

    match current {
        Err(e) => map_sqlx_error("load_order_version", e),
        Ok(None) => StoreError::NotFound("order"),
        Ok(Some(actual)) => match expected.check(version_from_db(actual)) {
            Err(err) => err.into(),
            Ok(()) => StoreError::Conflict(format!("order {id} changed during update")),
        },
    }
}

fn version_to_db(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn version_from_db(version: i64) -> u64 {
    u64::try_from(version).unwrap_or_default()
}

// SQLx row types

#[derive(Debug)]
struct OrderRow {
    id: i64,
    patient_id: i64,
    clinician_id: i64,
    diagnosis: String,
    doctor_advice: String,
    total_amount: f64,
    status: String,
    notes: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    patient_name: Option<String>,
    clinician_name: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for OrderRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            clinician_id: row.try_get("clinician_id")?,
            diagnosis: row.try_get("diagnosis")?,
            doctor_advice: row.try_get("doctor_advice")?,
            total_amount: row.try_get("total_amount")?,
            status: row.try_get("status")?,
            notes: row.try_get("notes")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            patient_name: row.try_get("patient_name")?,
            clinician_name: row.try_get("clinician_name")?,
        })
    }
}

impl OrderRow {
    fn into_details(self, items: Vec<OrderLineItem>) -> OrderDetails {
        let order = ClinicalOrder {
            id: OrderId::new(self.id),
            patient_id: PatientId::new(self.patient_id),
            clinician_id: ClinicianId::new(self.clinician_id),
            diagnosis: self.diagnosis,
            doctor_advice: self.doctor_advice,
            total_amount: self.total_amount,
            status: self.status,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: version_from_db(self.version),
        };
        OrderDetails::new(order, self.patient_name, self.clinician_name, items)
    }
}

#[derive(Debug)]
struct LineItemRow {
    id: i64,
    prescription_id: i64,
    medicine_id: Option<i64>,
    medicine_name: String,
    specification: String,
    dosage: String,
    usage: String,
    frequency: String,
    days: i64,
    quantity: i64,
    unit_price: f64,
    total_price: f64,
}

impl<'r> FromRow<'r, SqliteRow> for LineItemRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(LineItemRow {
            id: row.try_get("id")?,
            prescription_id: row.try_get("prescription_id")?,
            medicine_id: row.try_get("medicine_id")?,
            medicine_name: row.try_get("medicine_name")?,
            specification: row.try_get("specification")?,
            dosage: row.try_get("dosage")?,
            usage: row.try_get("usage")?,
            frequency: row.try_get("frequency")?,
            days: row.try_get("days")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            total_price: row.try_get("total_price")?,
        })
    }
}

impl From<LineItemRow> for OrderLineItem {
    fn from(row: LineItemRow) -> Self {
        OrderLineItem {
            id: LineItemId::new(row.id),
            order_id: OrderId::new(row.prescription_id),
            medicine_id: row.medicine_id.map(MedicineId::new),
            medicine_name: row.medicine_name,
            specification: row.specification,
            dosage: row.dosage,
            usage: row.usage,
            frequency: row.frequency,
            days: row.days,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
        }
    }
}
