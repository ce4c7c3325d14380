//! Common routes: health and version (no state), plus tenant-aware readiness and tenant listing.

use crate::extractors::CurrentTenant;
use crate::interceptor::{tenant_context, TenantInterceptor};
use crate::response::{success_many, success_one};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    tenant_id: String,
    cluster: String,
    database: &'static str,
}

#[derive(Deserialize)]
struct TenantsQuery {
    #[serde(default)]
    one_per_cluster: bool,
}

#[derive(Serialize)]
struct CurrentTenantBody {
    tenant_id: String,
    cluster: String,
    routed: bool,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness of the cluster the current tenant is routed to.
async fn ready(
    CurrentTenant(tenant_id): CurrentTenant,
    State(state): State<AppState>,
) -> Result<Json<ReadyBody>, (StatusCode, Json<ReadyBody>)> {
    let target = state.router.resolve_current_pool();
    let cluster = target.cluster_url.clone();
    if let Err(e) = sqlx::query("SELECT 1").fetch_optional(&target.pool).await {
        tracing::warn!(tenant_id = %tenant_id, cluster = %cluster, error = %e, "readiness check failed");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                tenant_id,
                cluster,
                database: "unavailable",
            }),
        ));
    }
    Ok(Json(ReadyBody {
        status: "ok",
        tenant_id,
        cluster,
        database: "ok",
    }))
}

async fn list_tenants(State(state): State<AppState>, Query(query): Query<TenantsQuery>) -> impl axum::response::IntoResponse {
    success_many(state.registry.list_tenants(query.one_per_cluster))
}

async fn current_tenant(
    CurrentTenant(tenant_id): CurrentTenant,
    State(state): State<AppState>,
) -> impl axum::response::IntoResponse {
    let cluster = state.router.resolve(&tenant_id).cluster_url.clone();
    let routed = state.router.is_routed(&tenant_id);
    success_one(CurrentTenantBody {
        tenant_id,
        cluster,
        routed,
    })
}

/// Common routes (no state): GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// Tenant-aware routes behind the tenant interceptor: GET /ready, GET /tenants,
/// GET /tenants/current.
pub fn tenant_routes(state: AppState, interceptor: TenantInterceptor) -> Router {
    Router::new()
        .route("/ready", get(ready))
        .route("/tenants", get(list_tenants))
        .route("/tenants/current", get(current_tenant))
        .with_state(state)
        .layer(middleware::from_fn_with_state(interceptor, tenant_context))
        .layer(TraceLayer::new_for_http())
}
