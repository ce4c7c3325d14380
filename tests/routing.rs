use async_trait::async_trait;
use multitenancy_sdk::config::{ClusterDescriptor, EmptyUrlPolicy, MigrationSettings, MultiTenancyConfig, PoolSettings};
use multitenancy_sdk::error::{AppError, ConfigError, MigrationError};
use multitenancy_sdk::migration::SchemaMigrator;
use multitenancy_sdk::router::{PoolFactory, TenantPool, TenantRouter};
use multitenancy_sdk::tenant::{self, TenantRegistry};
use std::sync::{Arc, Mutex};

/// Records which clusters were migrated; optionally fails for one url.
#[derive(Default)]
struct RecordingMigrator {
    migrated: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingMigrator {
    fn failing_on(url: &str) -> Self {
        RecordingMigrator {
            fail_on: Some(url.to_string()),
            ..Default::default()
        }
    }

    fn migrated(&self) -> Vec<String> {
        self.migrated.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaMigrator for RecordingMigrator {
    async fn migrate(&self, target: &TenantPool, _settings: &MigrationSettings) -> Result<(), MigrationError> {
        if self.fail_on.as_deref() == Some(target.cluster_url.as_str()) {
            return Err(MigrationError::Database {
                url: target.cluster_url.clone(),
                source: sqlx::Error::PoolTimedOut,
            });
        }
        self.migrated.lock().unwrap().push(target.cluster_url.clone());
        Ok(())
    }
}

const DEFAULT_URL: &str = "postgres://localhost:5432/default";
const CLUSTER0: &str = "postgres://localhost:5432/cluster0";
const CLUSTER1: &str = "postgres://localhost:5432/cluster1";

fn cluster(url: &str, projects: &str) -> ClusterDescriptor {
    ClusterDescriptor::new(url, "user", "password").with_projects(projects)
}

fn config(additional: Vec<ClusterDescriptor>) -> MultiTenancyConfig {
    let mut config = MultiTenancyConfig::new(ClusterDescriptor::new(DEFAULT_URL, "user", "password"));
    config.additional_clusters = additional;
    config.pool = PoolSettings {
        minimum_idle: 0,
        ..PoolSettings::default()
    };
    config
}

fn url_of(router: &TenantRouter, tenant_id: &str) -> String {
    router.resolve(tenant_id).cluster_url.clone()
}

#[tokio::test]
async fn unknown_tenants_fall_back_to_default_pool() {
    let migrator = RecordingMigrator::default();
    let mut registry = TenantRegistry::new();
    let router = TenantRouter::build(&config(vec![cluster(CLUSTER0, "p1")]), &migrator, &mut registry)
        .await
        .unwrap();

    for tenant_id in ["never-registered", "", "default", "P1"] {
        assert!(Arc::ptr_eq(router.resolve(tenant_id), router.default_pool()));
    }
    assert!(!Arc::ptr_eq(router.resolve("p1"), router.default_pool()));
}

#[tokio::test]
async fn resolves_pool_for_current_tenant() {
    let migrator = RecordingMigrator::default();
    let mut registry = TenantRegistry::new();
    let router = TenantRouter::build(&config(vec![cluster(CLUSTER0, "p1")]), &migrator, &mut registry)
        .await
        .unwrap();

    tenant::scope(async {
        assert_eq!(router.resolve_current_pool().cluster_url, DEFAULT_URL);
        tenant::set_current_tenant("p1");
        assert_eq!(router.resolve_current_pool().cluster_url, CLUSTER0);
        tenant::clear_current_tenant();
        assert_eq!(router.resolve_current_pool().cluster_url, DEFAULT_URL);
    })
    .await;
}

#[tokio::test]
async fn empty_url_stops_processing_of_later_clusters() {
    let migrator = RecordingMigrator::default();
    let mut registry = TenantRegistry::new();
    let clusters = vec![cluster(CLUSTER0, "p1, p2"), cluster("", ""), cluster(CLUSTER1, "p3")];
    let router = TenantRouter::build(&config(clusters), &migrator, &mut registry)
        .await
        .unwrap();

    assert_eq!(url_of(&router, "p1"), CLUSTER0);
    assert_eq!(url_of(&router, "p2"), CLUSTER0);
    assert!(Arc::ptr_eq(router.resolve("p1"), router.resolve("p2")));
    assert!(!router.is_routed("p3"));
    assert_eq!(router.routed_tenants(), vec!["p1", "p2"]);
    assert_eq!(registry.list_tenants(false), vec!["p1", "p2"]);
    assert_eq!(migrator.migrated(), vec![DEFAULT_URL, CLUSTER0]);
}

#[tokio::test]
async fn empty_url_last_maps_every_tenant() {
    let migrator = RecordingMigrator::default();
    let mut registry = TenantRegistry::new();
    let clusters = vec![cluster(CLUSTER0, "p1, p2"), cluster(CLUSTER1, "p3"), cluster("\"\"", "")];
    let router = TenantRouter::build(&config(clusters), &migrator, &mut registry)
        .await
        .unwrap();

    assert_eq!(url_of(&router, "p1"), CLUSTER0);
    assert_eq!(url_of(&router, "p2"), CLUSTER0);
    assert_eq!(url_of(&router, "p3"), CLUSTER1);
    assert_eq!(registry.list_tenants(true), vec!["p1", "p3"]);
    assert_eq!(registry.list_tenants(false), vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn skip_policy_continues_past_empty_url() {
    let migrator = RecordingMigrator::default();
    let mut registry = TenantRegistry::new();
    let mut config = config(vec![cluster(CLUSTER0, "p1"), cluster("", ""), cluster(CLUSTER1, "p3")]);
    config.empty_url_policy = EmptyUrlPolicy::Skip;
    let router = TenantRouter::build(&config, &migrator, &mut registry).await.unwrap();

    assert_eq!(url_of(&router, "p3"), CLUSTER1);
    assert_eq!(router.distinct_pools().len(), 3);
}

#[tokio::test]
async fn cluster_without_projects_is_fatal() {
    let migrator = RecordingMigrator::default();
    let mut registry = TenantRegistry::new();
    let result = TenantRouter::build(&config(vec![cluster(CLUSTER0, " , ")]), &migrator, &mut registry).await;

    assert!(matches!(
        result,
        Err(AppError::Config(ConfigError::EmptyProjects { .. }))
    ));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn missing_default_credentials_are_fatal_before_migration() {
    let migrator = RecordingMigrator::default();
    let mut registry = TenantRegistry::new();
    let config = MultiTenancyConfig::new(ClusterDescriptor::new(DEFAULT_URL, "", ""));
    let result = TenantRouter::build(&config, &migrator, &mut registry).await;

    assert!(matches!(
        result,
        Err(AppError::Config(ConfigError::MissingCredentials { field: "username", .. }))
    ));
    assert!(migrator.migrated().is_empty());
}

#[tokio::test]
async fn migration_failure_is_fatal() {
    let migrator = RecordingMigrator::failing_on(CLUSTER1);
    let mut registry = TenantRegistry::new();
    let result = TenantRouter::build(
        &config(vec![cluster(CLUSTER0, "p1"), cluster(CLUSTER1, "p3")]),
        &migrator,
        &mut registry,
    )
    .await;

    assert!(matches!(result, Err(AppError::Migration(_))));
    assert!(!registry.contains("p3"));
}

#[tokio::test]
async fn default_pool_migration_failure_is_fatal() {
    let migrator = RecordingMigrator::failing_on(DEFAULT_URL);
    let mut registry = TenantRegistry::new();
    let result = TenantRouter::build(&config(vec![cluster(CLUSTER0, "p1")]), &migrator, &mut registry).await;

    assert!(matches!(result, Err(AppError::Migration(_))));
    assert!(migrator.migrated().is_empty());
}

#[tokio::test]
async fn disabled_multi_tenancy_uses_default_cluster_only() {
    let migrator = RecordingMigrator::default();
    let mut registry = TenantRegistry::new();
    let mut config = config(vec![cluster(CLUSTER0, "p1")]);
    config.enabled = false;
    let router = TenantRouter::build(&config, &migrator, &mut registry).await.unwrap();

    assert_eq!(url_of(&router, "p1"), DEFAULT_URL);
    assert!(registry.is_empty());
    assert_eq!(migrator.migrated(), vec![DEFAULT_URL]);
}

#[tokio::test]
async fn later_cluster_wins_for_duplicate_project() {
    let migrator = RecordingMigrator::default();
    let mut registry = TenantRegistry::new();
    let router = TenantRouter::build(
        &config(vec![cluster(CLUSTER0, "p1, shared"), cluster(CLUSTER1, "shared")]),
        &migrator,
        &mut registry,
    )
    .await
    .unwrap();

    assert_eq!(url_of(&router, "shared"), CLUSTER1);
    assert_eq!(registry.list_tenants(true), vec!["p1", "shared"]);
}

#[tokio::test]
async fn factory_builds_default_pool_from_jdbc_url() {
    let migrator = RecordingMigrator::default();
    let settings = PoolSettings {
        minimum_idle: 0,
        maximum_pool_size: 3,
        ..PoolSettings::default()
    };
    let migration = MigrationSettings::default();
    let factory = PoolFactory::new(&settings, &migration, &migrator);
    let pool = factory
        .create_default_pool(&ClusterDescriptor::new("jdbc:postgresql://localhost:5432/default", "u", "p"))
        .await
        .unwrap();

    assert_eq!(pool.cluster_url, "jdbc:postgresql://localhost:5432/default");
    assert_eq!(pool.pool.options().get_max_connections(), 3);
}
