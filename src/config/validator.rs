//! Cluster validation and connection options.

use crate::config::ClusterDescriptor;
use crate::error::ConfigError;
use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;

const POSTGRES_DRIVERS: &[&str] = &["org.postgresql.Driver", "postgres", "postgresql"];

/// A url that means "no cluster": empty, whitespace, or the two-character string `""`.
pub fn is_blank_url(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || url == "\"\""
}

pub fn validate_default_cluster(cluster: &ClusterDescriptor) -> Result<(), ConfigError> {
    if is_blank_url(&cluster.url) {
        return Err(ConfigError::MissingCredentials {
            cluster: "default".into(),
            field: "url",
        });
    }
    if cluster.username.trim().is_empty() {
        return Err(ConfigError::MissingCredentials {
            cluster: cluster.url.clone(),
            field: "username",
        });
    }
    validate_driver(cluster)
}

/// An additional cluster with a real url must serve at least one project.
pub fn validate_additional_cluster(cluster: &ClusterDescriptor) -> Result<(), ConfigError> {
    if cluster.project_ids.is_empty() {
        return Err(ConfigError::EmptyProjects {
            url: cluster.url.clone(),
        });
    }
    validate_driver(cluster)
}

fn validate_driver(cluster: &ClusterDescriptor) -> Result<(), ConfigError> {
    let driver = cluster.driver_class_name.trim();
    if driver.is_empty() || POSTGRES_DRIVERS.iter().any(|d| d.eq_ignore_ascii_case(driver)) {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedDriver {
            url: cluster.url.clone(),
            driver: driver.to_string(),
        })
    }
}

/// Connection options for `cluster`. JDBC urls (`jdbc:postgresql://...`) are accepted.
/// Explicit username/password override whatever the url carries.
pub fn connect_options(cluster: &ClusterDescriptor) -> Result<PgConnectOptions, ConfigError> {
    let url = cluster.url.trim();
    let url = url.strip_prefix("jdbc:").unwrap_or(url);
    let mut opts = PgConnectOptions::from_str(url).map_err(|e| ConfigError::InvalidUrl {
        url: cluster.url.clone(),
        reason: e.to_string(),
    })?;
    if !cluster.username.is_empty() {
        opts = opts.username(&cluster.username);
    }
    if !cluster.password.is_empty() {
        opts = opts.password(&cluster.password);
    }
    Ok(opts)
}
