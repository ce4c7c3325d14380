//! Static cluster, pool, and migration configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const POSTGRES_DRIVER: &str = "org.postgresql.Driver";

fn default_driver() -> String {
    POSTGRES_DRIVER.to_string()
}

/// One physical PostgreSQL cluster and the projects (tenants) it serves.
#[derive(Clone, Default, Deserialize)]
pub struct ClusterDescriptor {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub password: String,
    #[serde(default = "default_driver", alias = "driverClassName")]
    pub driver_class_name: String,
    /// From the `projects` field: a comma-separated string or a JSON array.
    #[serde(default, rename = "projects", deserialize_with = "deserialize_projects")]
    pub project_ids: Vec<String>,
}

impl ClusterDescriptor {
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        ClusterDescriptor {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            driver_class_name: default_driver(),
            project_ids: Vec::new(),
        }
    }

    pub fn with_projects(mut self, projects: &str) -> Self {
        self.project_ids = parse_project_ids(projects);
        self
    }
}

impl fmt::Debug for ClusterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterDescriptor")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("driver_class_name", &self.driver_class_name)
            .field("project_ids", &self.project_ids)
            .finish()
    }
}

/// Split a comma-separated project list; entries are trimmed and blanks dropped.
pub fn parse_project_ids(projects: &str) -> Vec<String> {
    projects
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn null_as_empty<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn deserialize_projects<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Projects {
        Csv(String),
        List(Vec<String>),
    }
    Ok(match Option::<Projects>::deserialize(d)? {
        None => Vec::new(),
        Some(Projects::Csv(s)) => parse_project_ids(&s),
        Some(Projects::List(v)) => v
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// Sizing applied to every cluster pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    pub minimum_idle: u32,
    pub maximum_pool_size: u32,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            minimum_idle: 10,
            maximum_pool_size: 10,
            idle_timeout: Duration::from_millis(600_000),
            max_lifetime: Duration::from_millis(1_800_000),
        }
    }
}

/// Options handed to the schema migrator for every cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationSettings {
    /// Directory holding the `*.sql` changesets.
    pub change_log: PathBuf,
    pub contexts: Vec<String>,
    pub default_schema: Option<String>,
    pub drop_first: bool,
    pub enabled: bool,
    pub rollback_file: Option<PathBuf>,
    pub parameters: HashMap<String, String>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        MigrationSettings {
            change_log: PathBuf::from("db/changelog"),
            contexts: Vec::new(),
            default_schema: None,
            drop_first: false,
            enabled: true,
            rollback_file: None,
            parameters: HashMap::new(),
        }
    }
}

/// What to do with an additional cluster whose url is blank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmptyUrlPolicy {
    /// Stop processing this and every following additional cluster.
    #[default]
    Stop,
    /// Ignore this cluster and continue with the next one.
    Skip,
}

impl std::str::FromStr for EmptyUrlPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stop" => Ok(EmptyUrlPolicy::Stop),
            "skip" => Ok(EmptyUrlPolicy::Skip),
            _ => Err(ConfigError::InvalidValue {
                key: "EMPTY_CLUSTER_URL_POLICY".into(),
                value: s.to_string(),
            }),
        }
    }
}

/// Everything needed to build the routing table at startup.
#[derive(Clone, Debug)]
pub struct MultiTenancyConfig {
    /// When false only the default cluster is used.
    pub enabled: bool,
    pub default_cluster: ClusterDescriptor,
    pub additional_clusters: Vec<ClusterDescriptor>,
    pub empty_url_policy: EmptyUrlPolicy,
    pub pool: PoolSettings,
    pub migration: MigrationSettings,
}

impl MultiTenancyConfig {
    pub fn new(default_cluster: ClusterDescriptor) -> Self {
        MultiTenancyConfig {
            enabled: true,
            default_cluster,
            additional_clusters: Vec::new(),
            empty_url_policy: EmptyUrlPolicy::default(),
            pool: PoolSettings::default(),
            migration: MigrationSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_are_split_and_trimmed() {
        assert_eq!(parse_project_ids(" p1 ,p2,  p3"), vec!["p1", "p2", "p3"]);
        assert_eq!(parse_project_ids("p1,,p2, "), vec!["p1", "p2"]);
        assert!(parse_project_ids("").is_empty());
    }

    #[test]
    fn cluster_deserializes_csv_and_list_projects() {
        let csv: ClusterDescriptor =
            serde_json::from_str(r#"{"url":"postgres://h/c0","username":"u","password":"p","projects":"a, b"}"#)
                .unwrap();
        assert_eq!(csv.project_ids, vec!["a", "b"]);
        assert_eq!(csv.driver_class_name, POSTGRES_DRIVER);

        let list: ClusterDescriptor =
            serde_json::from_str(r#"{"url":"postgres://h/c1","projects":[" c ","d"]}"#).unwrap();
        assert_eq!(list.project_ids, vec!["c", "d"]);
    }

    #[test]
    fn null_fields_become_empty() {
        let c: ClusterDescriptor = serde_json::from_str(r#"{"url":null,"projects":null}"#).unwrap();
        assert!(c.url.is_empty());
        assert!(c.project_ids.is_empty());
    }

    #[test]
    fn debug_hides_password() {
        let c = ClusterDescriptor::new("postgres://h/db", "user", "s3cret");
        assert!(!format!("{:?}", c).contains("s3cret"));
    }

    #[test]
    fn empty_url_policy_parses() {
        assert_eq!("Skip".parse::<EmptyUrlPolicy>().unwrap(), EmptyUrlPolicy::Skip);
        assert_eq!("stop".parse::<EmptyUrlPolicy>().unwrap(), EmptyUrlPolicy::Stop);
        assert!("later".parse::<EmptyUrlPolicy>().is_err());
    }
}
