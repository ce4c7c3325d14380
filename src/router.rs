//! Tenant-to-pool routing table, built once at startup.
//!
//! Every configured cluster gets its own pool, migrated before anything is routed to it. At
//! request time the current tenant is looked up in an immutable map; tenants without a mapping
//! use the default pool.

use crate::config::{
    connect_options, is_blank_url, validate_additional_cluster, validate_default_cluster, ClusterDescriptor,
    EmptyUrlPolicy, MigrationSettings, MultiTenancyConfig, PoolSettings,
};
use crate::error::AppError;
use crate::migration::SchemaMigrator;
use crate::tenant::{current_tenant, TenantRegistry};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A cluster's connection pool together with the url it was built from.
pub struct TenantPool {
    pub cluster_url: String,
    pub pool: PgPool,
}

impl fmt::Debug for TenantPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantPool")
            .field("cluster_url", &self.cluster_url)
            .field("size", &self.pool.size())
            .finish()
    }
}

/// Builds and migrates cluster pools.
pub struct PoolFactory<'a> {
    pool_settings: &'a PoolSettings,
    migration_settings: &'a MigrationSettings,
    migrator: &'a dyn SchemaMigrator,
}

impl<'a> PoolFactory<'a> {
    pub fn new(
        pool_settings: &'a PoolSettings,
        migration_settings: &'a MigrationSettings,
        migrator: &'a dyn SchemaMigrator,
    ) -> Self {
        PoolFactory {
            pool_settings,
            migration_settings,
            migrator,
        }
    }

    /// Pool for the default cluster. Missing credentials and migration failures are fatal.
    pub async fn create_default_pool(&self, cluster: &ClusterDescriptor) -> Result<Arc<TenantPool>, AppError> {
        validate_default_cluster(cluster)?;
        self.create_pool(cluster).await
    }

    /// Pools for the additional clusters, keyed by project id. Every mapped project is also
    /// registered in `registry` under the cluster url.
    ///
    /// With [`EmptyUrlPolicy::Stop`] a cluster with a blank url ends processing: it and every
    /// cluster after it are left out.
    pub async fn create_additional_pools(
        &self,
        clusters: &[ClusterDescriptor],
        policy: EmptyUrlPolicy,
        registry: &mut TenantRegistry,
    ) -> Result<HashMap<String, Arc<TenantPool>>, AppError> {
        let mut tenant_pools = HashMap::new();
        for (index, cluster) in clusters.iter().enumerate() {
            if is_blank_url(&cluster.url) {
                match policy {
                    EmptyUrlPolicy::Stop => {
                        let ignored = clusters.len() - index - 1;
                        if ignored > 0 {
                            tracing::warn!(
                                position = index,
                                ignored,
                                "additional cluster has no url; remaining clusters are not processed"
                            );
                        }
                        break;
                    }
                    EmptyUrlPolicy::Skip => {
                        tracing::info!(position = index, "additional cluster has no url, skipping");
                        continue;
                    }
                }
            }
            validate_additional_cluster(cluster)?;
            let pool = self.create_pool(cluster).await?;
            for project_id in &cluster.project_ids {
                if let Some(previous) = tenant_pools.insert(project_id.clone(), Arc::clone(&pool)) {
                    tracing::warn!(
                        tenant_id = %project_id,
                        from = %previous.cluster_url,
                        to = %cluster.url,
                        "tenant mapped to more than one cluster; using the later one"
                    );
                }
                registry.register_tenant(&cluster.url, project_id);
            }
            tracing::info!(cluster = %cluster.url, tenants = cluster.project_ids.len(), "cluster routed");
        }
        Ok(tenant_pools)
    }

    async fn create_pool(&self, cluster: &ClusterDescriptor) -> Result<Arc<TenantPool>, AppError> {
        let options = connect_options(cluster)?;
        let settings = self.pool_settings;
        let pool = PgPoolOptions::new()
            .min_connections(settings.minimum_idle.min(settings.maximum_pool_size))
            .max_connections(settings.maximum_pool_size)
            .idle_timeout(settings.idle_timeout)
            .max_lifetime(settings.max_lifetime)
            .connect_lazy_with(options);
        let pool = Arc::new(TenantPool {
            cluster_url: cluster.url.clone(),
            pool,
        });
        tracing::info!(cluster = %cluster.url, max_connections = settings.maximum_pool_size, "pool created");
        self.migrator.migrate(&pool, self.migration_settings).await?;
        tracing::info!(cluster = %cluster.url, "pool migrated");
        Ok(pool)
    }
}

/// Read-only routing table from tenant id to cluster pool.
#[derive(Debug)]
pub struct TenantRouter {
    default_pool: Arc<TenantPool>,
    tenant_pools: HashMap<String, Arc<TenantPool>>,
}

impl TenantRouter {
    /// Build every pool described by `config`, registering routed tenants in `registry`.
    /// Additional clusters are ignored when multi-tenancy is disabled.
    pub async fn build(
        config: &MultiTenancyConfig,
        migrator: &dyn SchemaMigrator,
        registry: &mut TenantRegistry,
    ) -> Result<Self, AppError> {
        let factory = PoolFactory::new(&config.pool, &config.migration, migrator);
        let default_pool = factory.create_default_pool(&config.default_cluster).await?;
        let tenant_pools = if config.enabled {
            factory
                .create_additional_pools(&config.additional_clusters, config.empty_url_policy, registry)
                .await?
        } else {
            tracing::info!("multi-tenancy disabled; all tenants use the default cluster");
            HashMap::new()
        };
        Ok(TenantRouter::from_parts(default_pool, tenant_pools))
    }

    pub fn from_parts(default_pool: Arc<TenantPool>, tenant_pools: HashMap<String, Arc<TenantPool>>) -> Self {
        TenantRouter {
            default_pool,
            tenant_pools,
        }
    }

    /// Pool for the current tenant of this unit of work.
    pub fn resolve_current_pool(&self) -> &Arc<TenantPool> {
        self.resolve(&current_tenant())
    }

    /// Pool for `tenant_id`, or the default pool when the tenant is not routed.
    pub fn resolve(&self, tenant_id: &str) -> &Arc<TenantPool> {
        self.tenant_pools.get(tenant_id).unwrap_or(&self.default_pool)
    }

    /// A connection for the current tenant. Dropping it returns it to its pool.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, sqlx::Error> {
        self.resolve_current_pool().pool.acquire().await
    }

    pub fn default_pool(&self) -> &Arc<TenantPool> {
        &self.default_pool
    }

    pub fn is_routed(&self, tenant_id: &str) -> bool {
        self.tenant_pools.contains_key(tenant_id)
    }

    /// Tenant ids with a dedicated mapping, sorted.
    pub fn routed_tenants(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tenant_pools.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Every pool once: the default pool first, then cluster pools ordered by url.
    pub fn distinct_pools(&self) -> Vec<&Arc<TenantPool>> {
        let mut pools: Vec<&Arc<TenantPool>> = Vec::new();
        for pool in self.tenant_pools.values() {
            if !Arc::ptr_eq(pool, &self.default_pool) && !pools.iter().any(|p| Arc::ptr_eq(p, pool)) {
                pools.push(pool);
            }
        }
        pools.sort_by(|a, b| a.cluster_url.cmp(&b.cluster_url));
        pools.insert(0, &self.default_pool);
        pools
    }

    pub async fn close(&self) {
        for pool in self.distinct_pools() {
            pool.pool.close().await;
        }
    }
}
