//! Multitenancy SDK: per-tenant PostgreSQL pool routing with HTTP and message tenant interceptors.

pub mod config;
pub mod error;
pub mod extractors;
pub mod interceptor;
pub mod messaging;
pub mod migration;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod tenant;

pub use config::{ClusterDescriptor, EmptyUrlPolicy, MigrationSettings, MultiTenancyConfig, PoolSettings};
pub use error::{AppError, ConfigError, MessagingError, MigrationError};
pub use extractors::CurrentTenant;
pub use interceptor::{tenant_context, AccessPolicy, AllowAll, Operation, StaticAccessPolicy, TenantInterceptor};
pub use messaging::{TenantListenerContainer, TenantMessageTemplate};
pub use migration::{ChangelogMigrator, SchemaMigrator};
pub use router::{PoolFactory, TenantPool, TenantRouter};
pub use routes::{common_routes, tenant_routes};
pub use state::AppState;
pub use tenant::{current_tenant, TenantRegistry, DEFAULT_TENANT, PROJECT_ID_HEADER};
