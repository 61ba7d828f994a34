//! Medicine catalog store with an in-memory transliteration index.
//!
//! Catalog writes keep the index in step after the statement succeeds.
//! Autocomplete reads a fresh snapshot of the table and uses indexed keys only
//! where they were computed from the row's current name and specification.
//! Rows changed behind the index (another process, or two racing updates) are
//! matched with on-demand keys and re-keyed in the index afterwards.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info, instrument};

use clinicdesk_core::MedicineId;
use clinicdesk_lookup::{match_candidates, TransliterationIndex};
use clinicdesk_medicines::{IndexedMedicine, MedicineEntry, MedicineSearch, NewMedicine};

use crate::audit::{AuditEntry, AuditLog};
use crate::error::{map_sqlx_error, StoreError, StoreResult};

const AUDIT_MODULE: &str = "medicine";

const SELECT_MEDICINE: &str = r#"
    SELECT
        id, name, specification, unit, price, stock, min_stock, category, manufacturer,
        created_at, updated_at
    FROM medicines
"#;

#[derive(Debug)]
pub struct MedicineCatalog {
    pool: SqlitePool,
    audit: AuditLog,
    index: RwLock<TransliterationIndex<MedicineId>>,
}

impl MedicineCatalog {
    /// Build the catalog and its index from the current table contents.
    #[instrument(skip(pool, audit), err)]
    pub async fn load(pool: SqlitePool, audit: AuditLog) -> StoreResult<Self> {
        let catalog = Self {
            pool,
            audit,
            index: RwLock::new(TransliterationIndex::new()),
        };
        catalog.reindex().await?;
        Ok(catalog)
    }

    /// Rebuild the index from the table.
    pub async fn reindex(&self) -> StoreResult<usize> {
        let entries = self.fetch(&format!("{SELECT_MEDICINE} ORDER BY id")).await?;
        let index = TransliterationIndex::rebuild(
            entries
                .iter()
                .map(|e| (e.id, e.name.as_str(), Some(e.specification.as_str()))),
        );
        let indexed = index.len();
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
        info!(indexed, "medicine index rebuilt");
        Ok(indexed)
    }

    pub fn indexed_len(&self) -> usize {
        self.index.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[instrument(skip(self, medicine), err)]
    pub async fn create(&self, medicine: NewMedicine) -> StoreResult<MedicineEntry> {
        let medicine = medicine.validated()?;
        let now = Utc::now();

        let raw_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO medicines (
                name, specification, unit, price, stock, min_stock,
                category, manufacturer, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&medicine.name)
        .bind(&medicine.specification)
        .bind(&medicine.unit)
        .bind(medicine.price)
        .bind(medicine.stock)
        .bind(medicine.min_stock)
        .bind(&medicine.category)
        .bind(&medicine.manufacturer)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_medicine", e))?;

        let id = MedicineId::new(raw_id);
        self.index_entry(id, &medicine);
        info!(medicine_id = %id, "medicine created");
        self.audit.record(AuditEntry::new(
            AUDIT_MODULE,
            "create",
            format!("created medicine {id}"),
        ));
        self.get(id).await
    }

    #[instrument(skip(self, medicine), fields(medicine_id = %id), err)]
    pub async fn update(
        &self,
        id: MedicineId,
        medicine: NewMedicine,
    ) -> StoreResult<MedicineEntry> {
        let medicine = medicine.validated()?;

        let result = sqlx::query(
            r#"
            UPDATE medicines
            SET name = ?, specification = ?, unit = ?, price = ?, stock = ?, min_stock = ?,
                category = ?, manufacturer = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&medicine.name)
        .bind(&medicine.specification)
        .bind(&medicine.unit)
        .bind(medicine.price)
        .bind(medicine.stock)
        .bind(medicine.min_stock)
        .bind(&medicine.category)
        .bind(&medicine.manufacturer)
        .bind(Utc::now())
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_medicine", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("medicine"));
        }

        self.index_entry(id, &medicine);
        info!(medicine_id = %id, "medicine updated");
        self.audit.record(AuditEntry::new(
            AUDIT_MODULE,
            "update",
            format!("updated medicine {id}"),
        ));
        self.get(id).await
    }

    #[instrument(skip(self), fields(medicine_id = %id), err)]
    pub async fn delete(&self, id: MedicineId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM medicines WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_medicine", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("medicine"));
        }

        self.index.write().unwrap_or_else(PoisonError::into_inner).remove(id);
        info!(medicine_id = %id, "medicine deleted");
        self.audit.record(AuditEntry::new(
            AUDIT_MODULE,
            "delete",
            format!("deleted medicine {id}"),
        ));
        Ok(())
    }

    /// Set the on-hand stock count.
    #[instrument(skip(self), fields(medicine_id = %id), err)]
    pub async fn update_stock(&self, id: MedicineId, stock: i64) -> StoreResult<()> {
        if stock < 0 {
            return Err(StoreError::Validation("stock cannot be negative".to_string()));
        }

        let result = sqlx::query("UPDATE medicines SET stock = ?, updated_at = ? WHERE id = ?")
            .bind(stock)
            .bind(Utc::now())
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_medicine_stock", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("medicine"));
        }

        self.audit.record(AuditEntry::new(
            AUDIT_MODULE,
            "stock",
            format!("medicine {id} stock set to {stock}"),
        ));
        Ok(())
    }

    #[instrument(skip(self), fields(medicine_id = %id), err)]
    pub async fn get(&self, id: MedicineId) -> StoreResult<MedicineEntry> {
        let row = sqlx::query(&format!("{SELECT_MEDICINE} WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_medicine", e))?
            .ok_or(StoreError::NotFound("medicine"))?;

        decode(&row)
    }

    /// Fuzzy lookup over name (primary) and specification (secondary).
    ///
    /// Candidates are taken in name order; at most
    /// [`clinicdesk_lookup::MAX_MATCHES`] are returned.
    #[instrument(skip(self), err)]
    pub async fn autocomplete(&self, query: &str) -> StoreResult<Vec<MedicineEntry>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries = self
            .fetch(&format!("{SELECT_MEDICINE} ORDER BY name ASC, id ASC"))
            .await?;

        let (matches, stale) = {
            let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
            let candidates: Vec<IndexedMedicine<'_>> = entries
                .iter()
                .map(|e| IndexedMedicine::new(e, index.get(e.id)))
                .collect();

            let stale: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.is_indexed())
                .map(|(pos, _)| pos)
                .collect();
            let matches: Vec<MedicineEntry> = match_candidates(query, &candidates)
                .into_iter()
                .map(|c| c.entry.clone())
                .collect();
            (matches, stale)
        };

        if !stale.is_empty() {
            let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
            for entry in stale.iter().map(|&pos| &entries[pos]) {
                index.upsert(entry.id, &entry.name, Some(&entry.specification));
            }
            debug!(refreshed = stale.len(), "medicine index entries re-keyed");
        }

        Ok(matches)
    }

    /// Structured filter: name and manufacturer are substring matches,
    /// category is exact. Ordered by name.
    #[instrument(skip(self), err)]
    pub async fn search(&self, filter: &MedicineSearch) -> StoreResult<Vec<MedicineEntry>> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(SELECT_MEDICINE);
        builder.push(" WHERE 1 = 1");

        if let Some(name) = filter.name() {
            builder
                .push(" AND name LIKE ")
                .push_bind(like_pattern(name))
                .push(" ESCAPE '\\'");
        }
        if let Some(category) = filter.category() {
            builder.push(" AND category = ").push_bind(category.to_string());
        }
        if let Some(manufacturer) = filter.manufacturer() {
            builder
                .push(" AND manufacturer LIKE ")
                .push_bind(like_pattern(manufacturer))
                .push(" ESCAPE '\\'");
        }
        builder.push(" ORDER BY name ASC, id ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_medicines", e))?;

        rows.iter().map(decode).collect()
    }

    /// Entries at or below their reorder threshold, lowest stock first.
    #[instrument(skip(self), err)]
    pub async fn low_stock(&self) -> StoreResult<Vec<MedicineEntry>> {
        self.fetch(&format!(
            "{SELECT_MEDICINE} WHERE stock <= min_stock ORDER BY stock ASC, id ASC"
        ))
        .await
    }

    /// Distinct non-empty categories, sorted.
    #[instrument(skip(self), err)]
    pub async fn categories(&self) -> StoreResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT DISTINCT category FROM medicines WHERE category != '' ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_categories", e))
    }

    fn index_entry(&self, id: MedicineId, medicine: &NewMedicine) {
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert(id, &medicine.name, Some(&medicine.specification));
    }

    async fn fetch(&self, sql: &str) -> StoreResult<Vec<MedicineEntry>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_medicines", e))?;
        rows.iter().map(decode).collect()
    }
}

fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn decode(row: &SqliteRow) -> StoreResult<MedicineEntry> {
    MedicineRow::from_row(row)
        .map(MedicineEntry::from)
        .map_err(|e| map_sqlx_error("decode_medicine", e))
}

// SQLx row types

#[derive(Debug)]
struct MedicineRow {
    id: i64,
    name: String,
    specification: String,
    unit: String,
    price: f64,
    stock: i64,
    min_stock: i64,
    category: String,
    manufacturer: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for MedicineRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(MedicineRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            specification: row.try_get("specification")?,
            unit: row.try_get("unit")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
            min_stock: row.try_get("min_stock")?,
            category: row.try_get("category")?,
            manufacturer: row.try_get("manufacturer")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<MedicineRow> for MedicineEntry {
    fn from(row: MedicineRow) -> Self {
        MedicineEntry {
            id: MedicineId::new(row.id),
            name: row.name,
            specification: row.specification,
            unit: row.unit,
            price: row.price,
            stock: row.stock,
            min_stock: row.min_stock,
            category: row.category,
            manufacturer: row.manufacturer,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
