//! Load [`MultiTenancyConfig`] from environment variables (and `.env`) or any key lookup.

use crate::config::types::*;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

impl MultiTenancyConfig {
    /// Read configuration from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Read configuration through `lookup`. Unset keys fall back to defaults; the default
    /// cluster's url and username are checked later, when its pool is created.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_cluster = ClusterDescriptor {
            url: get("DATABASE_URL").unwrap_or_default(),
            username: get("DATABASE_USERNAME").unwrap_or_default(),
            password: lookup("DATABASE_PASSWORD").unwrap_or_default(),
            driver_class_name: get("DATABASE_DRIVER_CLASS_NAME").unwrap_or_else(|| POSTGRES_DRIVER.to_string()),
            project_ids: Vec::new(),
        };

        let additional_clusters = match (get("ADDITIONAL_CLUSTERS"), get("ADDITIONAL_CLUSTERS_FILE")) {
            (Some(inline), _) => parse_clusters(&inline)?,
            (None, Some(path)) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::Load(format!("{}: {}", path, e)))?;
                parse_clusters(&text)?
            }
            (None, None) => Vec::new(),
        };

        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            minimum_idle: parse_or("POOL_MINIMUM_IDLE", get("POOL_MINIMUM_IDLE"), defaults.minimum_idle)?,
            maximum_pool_size: parse_or(
                "POOL_MAXIMUM_POOL_SIZE",
                get("POOL_MAXIMUM_POOL_SIZE"),
                defaults.maximum_pool_size,
            )?,
            idle_timeout: millis_or("POOL_IDLE_TIMEOUT_MS", get("POOL_IDLE_TIMEOUT_MS"), defaults.idle_timeout)?,
            max_lifetime: millis_or("POOL_MAX_LIFETIME_MS", get("POOL_MAX_LIFETIME_MS"), defaults.max_lifetime)?,
        };

        let migration_defaults = MigrationSettings::default();
        let migration = MigrationSettings {
            change_log: get("MIGRATION_CHANGE_LOG")
                .map(PathBuf::from)
                .unwrap_or(migration_defaults.change_log),
            contexts: get("MIGRATION_CONTEXTS")
                .map(|s| parse_project_ids(&s))
                .unwrap_or_default(),
            default_schema: get("MIGRATION_DEFAULT_SCHEMA"),
            drop_first: bool_or("MIGRATION_DROP_FIRST", get("MIGRATION_DROP_FIRST"), false)?,
            enabled: bool_or("MIGRATION_ENABLED", get("MIGRATION_ENABLED"), true)?,
            rollback_file: get("MIGRATION_ROLLBACK_FILE").map(PathBuf::from),
            parameters: match get("MIGRATION_PARAMETERS") {
                Some(s) => parse_parameters(&s)?,
                None => HashMap::new(),
            },
        };

        Ok(MultiTenancyConfig {
            enabled: bool_or("MULTI_TENANCY_ENABLED", get("MULTI_TENANCY_ENABLED"), true)?,
            default_cluster,
            additional_clusters,
            empty_url_policy: match get("EMPTY_CLUSTER_URL_POLICY") {
                Some(s) => s.parse()?,
                None => EmptyUrlPolicy::default(),
            },
            pool,
            migration,
        })
    }
}

/// Parse a JSON array of cluster records.
pub fn parse_clusters(json: &str) -> Result<Vec<ClusterDescriptor>, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(format!("additional clusters: {}", e)))
}

/// Parse `key=value` pairs separated by commas.
pub fn parse_parameters(s: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut out = HashMap::new();
    for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
            key: "MIGRATION_PARAMETERS".into(),
            value: pair.to_string(),
        })?;
        out.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(out)
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
    }
}

fn millis_or(key: &str, value: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(_) => parse_or::<u64>(key, value, 0).map(Duration::from_millis),
    }
}

fn bool_or(key: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: v.clone(),
            }),
        },
    }
}
