//! Patient records and name-based resolution.
//!
//! The `pinyin` column is written from the name on every insert and update,
//! so searches can trust it without recomputing.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};
use tracing::{debug, info, instrument};

use clinicdesk_core::PatientId;
use clinicdesk_lookup::{full_key, match_candidates};
use clinicdesk_patients::{Demographics, NewPatient, Patient, PatientCandidate};

use crate::audit::{AuditEntry, AuditLog};
use crate::error::{map_sqlx_error, StoreError, StoreResult};

const AUDIT_MODULE: &str = "patient";

const SELECT_PATIENT: &str = r#"
    SELECT
        id, name, pinyin, gender, age, phone, address, id_card, medical_history,
        created_at, updated_at
    FROM patients
"#;

#[derive(Debug, Clone)]
pub struct PatientResolver {
    pool: SqlitePool,
    audit: AuditLog,
}

impl PatientResolver {
    pub fn new(pool: SqlitePool, audit: AuditLog) -> Self {
        Self { pool, audit }
    }

    /// Find the patient with exactly this (trimmed) name, or create one.
    ///
    /// Returns the patient and whether this call created it. Concurrent calls
    /// with the same name converge on a single row; exactly one of them
    /// reports `true`. `demographics` are only used when creating.
    #[instrument(skip(self, name, demographics), err)]
    pub async fn resolve_or_create(
        &self,
        name: &str,
        demographics: Demographics,
    ) -> StoreResult<(Patient, bool)> {
        let new_patient = NewPatient::new(name, demographics)?;

        if let Some(existing) = self.find_by_name(new_patient.name()).await? {
            debug!(patient_id = %existing.id, "patient resolved by name");
            return Ok((existing, false));
        }

        let inserted = self.insert(&new_patient, true).await?;
        let patient = self
            .find_by_name(new_patient.name())
            .await?
            .ok_or_else(|| {
                StoreError::Persistence(format!(
                    "patient {:?} missing after insert",
                    new_patient.name()
                ))
            })?;

        let created = inserted.is_some();
        if created {
            info!(patient_id = %patient.id, "patient created");
            self.audit.record(AuditEntry::new(
                AUDIT_MODULE,
                "create",
                format!("created patient {}", patient.id),
            ));
        }
        Ok((patient, created))
    }

    /// Insert a new patient. A duplicate name is a `Conflict`.
    #[instrument(skip(self, new_patient), err)]
    pub async fn create(&self, new_patient: NewPatient) -> StoreResult<Patient> {
        let id = self
            .insert(&new_patient, false)
            .await?
            .ok_or_else(|| StoreError::Persistence("patient insert returned no id".to_string()))?;

        info!(patient_id = %id, "patient created");
        self.audit.record(AuditEntry::new(
            AUDIT_MODULE,
            "create",
            format!("created patient {id}"),
        ));
        self.get(id).await
    }

    /// Overwrite a patient's name and demographics; the key follows the name.
    #[instrument(skip(self, patient), fields(patient_id = %id), err)]
    pub async fn update(&self, id: PatientId, patient: NewPatient) -> StoreResult<Patient> {
        let (name, demographics) = patient.into_parts();
        let result = sqlx::query(
            r#"
            UPDATE patients
            SET name = ?, pinyin = ?, gender = ?, age = ?, phone = ?, address = ?,
                id_card = ?, medical_history = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&name)
        .bind(full_key(&name))
        .bind(&demographics.gender)
        .bind(demographics.age.map(i64::from))
        .bind(&demographics.phone)
        .bind(&demographics.address)
        .bind(&demographics.id_card)
        .bind(&demographics.medical_history)
        .bind(Utc::now())
        .bind(id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_patient", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("patient"));
        }

        info!(patient_id = %id, "patient updated");
        self.audit.record(AuditEntry::new(
            AUDIT_MODULE,
            "update",
            format!("updated patient {id}"),
        ));
        self.get(id).await
    }

    #[instrument(skip(self), fields(patient_id = %id), err)]
    pub async fn get(&self, id: PatientId) -> StoreResult<Patient> {
        let row = sqlx::query(&format!("{SELECT_PATIENT} WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_patient", e))?
            .ok_or(StoreError::NotFound("patient"))?;

        decode(&row)
    }

    /// Fuzzy search over all patients, newest first, capped at
    /// [`clinicdesk_lookup::MAX_MATCHES`].
    #[instrument(skip(self), err)]
    pub async fn search(&self, query: &str) -> StoreResult<Vec<Patient>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!("{SELECT_PATIENT} ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_patients", e))?;

        let candidates = rows
            .iter()
            .map(|row| decode(row).map(PatientCandidate::new))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(match_candidates(query, &candidates)
            .into_iter()
            .map(|c| c.patient().clone())
            .collect())
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Patient>> {
        let row = sqlx::query(&format!("{SELECT_PATIENT} WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_patient_by_name", e))?;

        row.as_ref().map(decode).transpose()
    }

    /// Returns `None` only when `ignore_duplicate` is set and the name exists.
    async fn insert(
        &self,
        patient: &NewPatient,
        ignore_duplicate: bool,
    ) -> StoreResult<Option<PatientId>> {
        let sql = if ignore_duplicate {
            r#"
            INSERT INTO patients (
                name, pinyin, gender, age, phone, address, id_card, medical_history,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#
        } else {
            r#"
            INSERT INTO patients (
                name, pinyin, gender, age, phone, address, id_card, medical_history,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#
        };

        let now = Utc::now();
        let demographics = patient.demographics();
        let id: Option<i64> = sqlx::query_scalar(sql)
            .bind(patient.name())
            .bind(full_key(patient.name()))
            .bind(&demographics.gender)
            .bind(demographics.age.map(i64::from))
            .bind(&demographics.phone)
            .bind(&demographics.address)
            .bind(&demographics.id_card)
            .bind(&demographics.medical_history)
            .bind(now)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_patient", e))?;

        Ok(id.map(PatientId::new))
    }
}

fn decode(row: &SqliteRow) -> StoreResult<Patient> {
    PatientRow::from_row(row)
        .map(Patient::from)
        .map_err(|e| map_sqlx_error("decode_patient", e))
}

// SQLx row types

#[derive(Debug)]
struct PatientRow {
    id: i64,
    name: String,
    pinyin: String,
    gender: Option<String>,
    age: Option<i64>,
    phone: Option<String>,
    address: Option<String>,
    id_card: Option<String>,
    medical_history: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for PatientRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(PatientRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            pinyin: row.try_get("pinyin")?,
            gender: row.try_get("gender")?,
            age: row.try_get("age")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            id_card: row.try_get("id_card")?,
            medical_history: row.try_get("medical_history")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<PatientRow> for Patient {
    fn from(row: PatientRow) -> Self {
        Patient {
            id: PatientId::new(row.id),
            name: row.name,
            pinyin: row.pinyin,
            demographics: Demographics {
                gender: row.gender,
                age: row.age.and_then(|a| u32::try_from(a).ok()),
                phone: row.phone,
                address: row.address,
                id_card: row.id_card,
                medical_history: row.medical_history,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
