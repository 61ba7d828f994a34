//! Environment-driven configuration.

use anyhow::{bail, Context};

use clinicdesk_prescriptions::{StatusPolicy, TotalPolicy};

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "CLINICDESK_DB_MAX_CONNECTIONS";
pub const STATUS_POLICY: &str = "CLINICDESK_STATUS_POLICY";
pub const ENFORCE_ORDER_TOTAL: &str = "CLINICDESK_ENFORCE_ORDER_TOTAL";
pub const AUDIT_QUEUE_CAPACITY: &str = "CLINICDESK_AUDIT_QUEUE_CAPACITY";
pub const SEED_SAMPLE_DATA: &str = "CLINICDESK_SEED_SAMPLE_DATA";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://clinic.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicConfig {
    pub database: DatabaseConfig,
    pub status_policy: StatusPolicy,
    pub total_policy: TotalPolicy,
    pub audit_queue_capacity: usize,
    pub seed_sample_data: bool,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            status_policy: StatusPolicy::default(),
            total_policy: TotalPolicy::default(),
            audit_queue_capacity: 256,
            seed_sample_data: false,
        }
    }
}

impl ClinicConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(DATABASE_URL) {
            config.database.url = url.trim().to_string();
        }
        if let Some(raw) = get(DB_MAX_CONNECTIONS) {
            let max: u32 = raw
                .trim()
                .parse()
                .with_context(|| {
                    format!("{DB_MAX_CONNECTIONS} must be a positive integer, got {raw:?}")
                })?;
            if max == 0 {
                bail!("{DB_MAX_CONNECTIONS} must be at least 1");
            }
            config.database.max_connections = max;
        }
        if let Some(raw) = get(STATUS_POLICY) {
            config.status_policy = raw
                .parse()
                .with_context(|| format!("invalid {STATUS_POLICY}"))?;
        }
        if let Some(raw) = get(ENFORCE_ORDER_TOTAL) {
            let enforce = parse_flag(ENFORCE_ORDER_TOTAL, &raw)?;
            config.total_policy = TotalPolicy::from_enforce_flag(enforce);
        }
        if let Some(raw) = get(AUDIT_QUEUE_CAPACITY) {
            let capacity: usize = raw
                .trim()
                .parse()
                .with_context(|| {
                    format!("{AUDIT_QUEUE_CAPACITY} must be a positive integer, got {raw:?}")
                })?;
            if capacity == 0 {
                bail!("{AUDIT_QUEUE_CAPACITY} must be at least 1");
            }
            config.audit_queue_capacity = capacity;
        }
        if let Some(raw) = get(SEED_SAMPLE_DATA) {
            config.seed_sample_data = parse_flag(SEED_SAMPLE_DATA, &raw)?;
        }

        Ok(config)
    }
}

fn parse_flag(key: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{key} must be a boolean flag, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<ClinicConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClinicConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, ClinicConfig::default());
        assert_eq!(config.database.url, "sqlite://clinic.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.status_policy, StatusPolicy::Permissive);
        assert_eq!(config.total_policy, TotalPolicy::WarnOnly);
        assert_eq!(config.audit_queue_capacity, 256);
        assert!(!config.seed_sample_data);
    }

    #[test]
    fn every_variable_is_read() {
        let config = config_from(&[
            (DATABASE_URL, "sqlite::memory:"),
            (DB_MAX_CONNECTIONS, "1"),
            (STATUS_POLICY, "forward-only"),
            (ENFORCE_ORDER_TOTAL, "true"),
            (AUDIT_QUEUE_CAPACITY, "16"),
            (SEED_SAMPLE_DATA, "yes"),
        ])
        .unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 1);
        assert_eq!(config.status_policy, StatusPolicy::ForwardOnly);
        assert_eq!(config.total_policy, TotalPolicy::Enforce);
        assert_eq!(config.audit_queue_capacity, 16);
        assert!(config.seed_sample_data);
    }

    #[test]
    fn invalid_values_fail_with_the_variable_name() {
        let err = config_from(&[(DB_MAX_CONNECTIONS, "lots")]).unwrap_err();
        assert!(format!("{err:#}").contains(DB_MAX_CONNECTIONS));

        let err = config_from(&[(STATUS_POLICY, "strict")]).unwrap_err();
        assert!(format!("{err:#}").contains(STATUS_POLICY));

        assert!(config_from(&[(ENFORCE_ORDER_TOTAL, "maybe")]).is_err());
        assert!(config_from(&[(AUDIT_QUEUE_CAPACITY, "0")]).is_err());
    }

    #[test]
    fn blank_values_keep_defaults() {
        let config = config_from(&[(DATABASE_URL, "  "), (STATUS_POLICY, "")]).unwrap();
        assert_eq!(config.database.url, "sqlite://clinic.db");
        assert_eq!(config.status_policy, StatusPolicy::Permissive);
    }
}
