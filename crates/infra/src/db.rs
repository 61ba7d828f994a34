//! Connection pool, schema, and sample data bootstrap.

use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use clinicdesk_core::ClinicianId;

use crate::config::DatabaseConfig;

/// Schema statements, applied in order. Every statement is idempotent.
///
/// `prescriptions` carries no foreign keys to `patients`/`clinicians`; order
/// reads degrade to placeholder names when a reference is gone.
const SCHEMA: &[(&str, &str)] = &[
    (
        "clinicians",
        r#"
        CREATE TABLE IF NOT EXISTS clinicians (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "patients",
        r#"
        CREATE TABLE IF NOT EXISTS patients (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            pinyin          TEXT NOT NULL DEFAULT '',
            gender          TEXT NULL,
            age             INTEGER NULL,
            phone           TEXT NULL,
            address         TEXT NULL,
            id_card         TEXT NULL,
            medical_history TEXT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        )
        "#,
    ),
    (
        "patients_name_unique",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_patients_name ON patients (name)",
    ),
    (
        "medicines",
        r#"
        CREATE TABLE IF NOT EXISTS medicines (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            name          TEXT NOT NULL,
            specification TEXT NOT NULL DEFAULT '',
            unit          TEXT NOT NULL DEFAULT '',
            price         REAL NOT NULL DEFAULT 0,
            stock         INTEGER NOT NULL DEFAULT 0,
            min_stock     INTEGER NOT NULL DEFAULT 0,
            category      TEXT NOT NULL DEFAULT '',
            manufacturer  TEXT NOT NULL DEFAULT '',
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        )
        "#,
    ),
    (
        "medicines_name",
        "CREATE INDEX IF NOT EXISTS idx_medicines_name ON medicines (name)",
    ),
    (
        "prescriptions",
        r#"
        CREATE TABLE IF NOT EXISTS prescriptions (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id    INTEGER NOT NULL,
            clinician_id  INTEGER NOT NULL,
            diagnosis     TEXT NOT NULL DEFAULT '',
            doctor_advice TEXT NOT NULL DEFAULT '',
            total_amount  REAL NOT NULL DEFAULT 0,
            status        TEXT NOT NULL DEFAULT 'draft',
            notes         TEXT NOT NULL DEFAULT '',
            version       INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        )
        "#,
    ),
    (
        "prescription_items",
        r#"
        CREATE TABLE IF NOT EXISTS prescription_items (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            prescription_id INTEGER NOT NULL REFERENCES prescriptions (id),
            medicine_id     INTEGER NULL,
            medicine_name   TEXT NOT NULL,
            specification   TEXT NOT NULL DEFAULT '',
            dosage          TEXT NOT NULL DEFAULT '',
            usage           TEXT NOT NULL DEFAULT '',
            frequency       TEXT NOT NULL DEFAULT '',
            days            INTEGER NOT NULL DEFAULT 1,
            quantity        INTEGER NOT NULL DEFAULT 1,
            unit_price      REAL NOT NULL DEFAULT 0,
            total_price     REAL NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "prescription_items_order",
        "CREATE INDEX IF NOT EXISTS idx_prescription_items_order ON prescription_items (prescription_id, id)",
    ),
    (
        "operation_logs",
        r#"
        CREATE TABLE IF NOT EXISTS operation_logs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            actor_id    INTEGER NULL,
            action      TEXT NOT NULL,
            module      TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL
        )
        "#,
    ),
];

/// (name, specification, unit, category, manufacturer, price, stock)
const SAMPLE_MEDICINES: &[(&str, &str, &str, &str, &str, f64, i64)] = &[
    ("阿莫西林胶囊", "0.25g*24粒", "盒", "抗生素", "华北制药", 15.50, 100),
    ("布洛芬片", "0.1g*20片", "盒", "解热镇痛", "中美史克", 8.80, 80),
    ("感冒灵颗粒", "10g*10袋", "盒", "感冒药", "999药业", 12.00, 60),
    ("维生素C片", "0.1g*100片", "瓶", "维生素", "东北制药", 5.50, 120),
    ("板蓝根颗粒", "10g*20袋", "盒", "清热解毒", "白云山", 18.00, 50),
];

const SAMPLE_MIN_STOCK: i64 = 10;

const DEFAULT_CLINICIAN: &str = "张医生";

/// Open a pool for `config`, creating the database file if missing.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("invalid database url {:?}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open SQLite pool at {:?}", config.url))
}

/// Create tables and indexes.
pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    for (name, statement) in SCHEMA {
        sqlx::query(*statement)
            .execute(pool)
            .await
            .with_context(|| format!("failed to apply schema step {name}"))?;
    }
    Ok(())
}

/// Insert the sample catalog and a default clinician into empty tables.
pub async fn seed_sample_data(pool: &SqlitePool) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("failed to begin seed transaction")?;

    let medicines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM medicines")
        .fetch_one(&mut *tx)
        .await
        .context("failed to count medicines")?;
    if medicines == 0 {
        for (name, specification, unit, category, manufacturer, price, stock) in SAMPLE_MEDICINES {
            sqlx::query(
                r#"
                INSERT INTO medicines (
                    name, specification, unit, price, stock, min_stock,
                    category, manufacturer, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(*name)
            .bind(*specification)
            .bind(*unit)
            .bind(*price)
            .bind(*stock)
            .bind(SAMPLE_MIN_STOCK)
            .bind(*category)
            .bind(*manufacturer)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to seed medicine {name}"))?;
        }
        info!(count = SAMPLE_MEDICINES.len(), "seeded sample medicines");
    }

    let clinicians: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clinicians")
        .fetch_one(&mut *tx)
        .await
        .context("failed to count clinicians")?;
    if clinicians == 0 {
        sqlx::query("INSERT INTO clinicians (name, created_at) VALUES (?, ?)")
            .bind(DEFAULT_CLINICIAN)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("failed to seed default clinician")?;
        info!("seeded default clinician");
    }

    tx.commit().await.context("failed to commit seed transaction")?;
    Ok(())
}

/// Add a clinician so that order reads can resolve their display name.
pub async fn register_clinician(pool: &SqlitePool, name: &str) -> anyhow::Result<ClinicianId> {
    let name = name.trim();
    anyhow::ensure!(!name.is_empty(), "clinician name cannot be empty");

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO clinicians (name, created_at) VALUES (?, ?) RETURNING id",
    )
    .bind(name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to register clinician {name}"))?;
    Ok(ClinicianId::new(id))
}
