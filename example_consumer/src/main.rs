//! Example consumer: builds the tenant routing table from the environment and serves the tenant routes.
//!
//! Run from repo root: `cargo run -p example-consumer`
//!
//! Additional clusters come from `ADDITIONAL_CLUSTERS` (JSON array) or `ADDITIONAL_CLUSTERS_FILE`.
//! `ALLOWED_TENANTS` (comma-separated) restricts which `X-Project-Id` values are accepted;
//! when unset every tenant is allowed.

use multitenancy_sdk::{
    common_routes, tenant_routes, AccessPolicy, AllowAll, AppState, ChangelogMigrator, MultiTenancyConfig,
    StaticAccessPolicy, TenantInterceptor, TenantRegistry, TenantRouter,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("multitenancy_sdk=info,example_consumer=info")),
        )
        .init();

    let config = MultiTenancyConfig::from_env()?;
    let mut registry = TenantRegistry::new();
    let router = TenantRouter::build(&config, &ChangelogMigrator, &mut registry).await?;
    tracing::info!(
        tenants = registry.len(),
        clusters = router.distinct_pools().len(),
        "routing table ready"
    );

    let policy: Arc<dyn AccessPolicy> = match std::env::var("ALLOWED_TENANTS") {
        Ok(list) => Arc::new(StaticAccessPolicy::new(
            list.split(',').map(str::trim).filter(|t| !t.is_empty()),
        )),
        Err(_) => Arc::new(AllowAll),
    };
    let state = AppState::new(router, registry);
    let app = axum::Router::new()
        .merge(common_routes())
        .merge(tenant_routes(state.clone(), TenantInterceptor::new(policy)));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    state.router.close().await;
    Ok(())
}
