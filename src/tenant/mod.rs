//! Tenant identity: the current tenant of a unit of work and the registry of known tenants.

pub mod context;
pub mod registry;

pub use context::*;
pub use registry::TenantRegistry;

/// Tenant used when a request or message names none.
pub const DEFAULT_TENANT: &str = "default";

/// Header (and message property) carrying the tenant id.
pub const PROJECT_ID_HEADER: &str = "X-Project-Id";
