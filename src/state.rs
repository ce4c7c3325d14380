//! Shared application state for all routes. Built once at startup, read-only afterwards.

use crate::router::TenantRouter;
use crate::tenant::TenantRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<TenantRouter>,
    pub registry: Arc<TenantRegistry>,
}

impl AppState {
    pub fn new(router: TenantRouter, registry: TenantRegistry) -> Self {
        AppState {
            router: Arc::new(router),
            registry: Arc::new(registry),
        }
    }
}
