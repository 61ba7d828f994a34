//! Create or upgrade the clinic database, then report what it holds.

use anyhow::Context;

use clinicdesk_infra::{Clinic, ClinicConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    clinicdesk_observability::init();

    let config = ClinicConfig::from_env().context("failed to read configuration")?;
    tracing::info!(
        database = %config.database.url,
        seed = config.seed_sample_data,
        "preparing database"
    );

    let clinic = Clinic::open(&config).await?;
    let categories = clinic.medicines().categories().await?;
    tracing::info!(
        medicines = clinic.medicines().indexed_len(),
        categories = categories.len(),
        "database ready"
    );

    clinic.shutdown().await;
    Ok(())
}
