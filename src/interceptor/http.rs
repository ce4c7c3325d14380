//! HTTP entry interceptor: tenant from the `X-Project-Id` header, checked against an access policy.

use crate::error::AppError;
use crate::tenant::{self, TenantGuard, PROJECT_ID_HEADER};
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Operation a caller wants to perform on a tenant's data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Execute,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "CREATE",
            Operation::Read => "READ",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Execute => "EXECUTE",
        })
    }
}

/// Authorization collaborator consulted for every request that names a tenant.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn check_access(&self, tenant_id: &str, operation: Operation) -> bool;
}

/// Grants everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessPolicy for AllowAll {
    async fn check_access(&self, _tenant_id: &str, _operation: Operation) -> bool {
        true
    }
}

/// Grants any operation on a fixed set of tenants.
#[derive(Clone, Debug, Default)]
pub struct StaticAccessPolicy {
    allowed: HashSet<String>,
}

impl StaticAccessPolicy {
    pub fn new<I, S>(tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StaticAccessPolicy {
            allowed: tenants.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl AccessPolicy for StaticAccessPolicy {
    async fn check_access(&self, tenant_id: &str, _operation: Operation) -> bool {
        self.allowed.contains(tenant_id)
    }
}

/// Middleware state: the policy used to authorize tenant headers.
#[derive(Clone)]
pub struct TenantInterceptor {
    policy: Arc<dyn AccessPolicy>,
}

impl TenantInterceptor {
    pub fn new(policy: Arc<dyn AccessPolicy>) -> Self {
        TenantInterceptor { policy }
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let _guard = TenantGuard::new();
        let header = request
            .headers()
            .get(PROJECT_ID_HEADER)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
        match header {
            None => tenant::set_default_tenant(),
            Some(tenant_id) => {
                if !self.policy.check_access(&tenant_id, Operation::Read).await {
                    tracing::warn!(tenant_id = %tenant_id, path = %request.uri().path(), "tenant access denied");
                    return AppError::AccessDenied(tenant_id).into_response();
                }
                tenant::set_current_tenant(tenant_id);
            }
        }
        next.run(request).await
    }
}

/// axum middleware: runs the rest of the chain in a fresh tenant scope.
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(axum::middleware::from_fn_with_state(interceptor, tenant_context));
/// ```
pub async fn tenant_context(State(interceptor): State<TenantInterceptor>, request: Request, next: Next) -> Response {
    tenant::scope(interceptor.handle(request, next)).await
}

/// Escape HTML-significant characters as entities. Non-ASCII characters become numeric
/// character references.
pub fn escape_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&#034;"),
            '\'' => out.push_str("&#039;"),
            '(' => out.push_str("&#040;"),
            ')' => out.push_str("&#041;"),
            '#' => out.push_str("&#035;"),
            '%' => out.push_str("&#037;"),
            ';' => out.push_str("&#059;"),
            '+' => out.push_str("&#043;"),
            '-' => out.push_str("&#045;"),
            c if c.is_ascii() => out.push(c),
            c => {
                out.push_str("&#");
                out.push_str(&(c as u32).to_string());
                out.push(';');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_entities("<script>alert('x')</script>"),
            "&lt;script&gt;alert&#040;&#039;x&#039;&#041;&lt;/script&gt;"
        );
        assert_eq!(escape_entities("a&b"), "a&amp;b");
        assert_eq!(escape_entities("é"), "&#233;");
        assert_eq!(escape_entities("plain"), "plain");
    }

    #[test]
    fn operation_names() {
        assert_eq!(Operation::Read.to_string(), "READ");
    }

    #[tokio::test]
    async fn static_policy_allows_listed_tenants_only() {
        let policy = StaticAccessPolicy::new(["t1"]);
        assert!(policy.check_access("t1", Operation::Read).await);
        assert!(!policy.check_access("t2", Operation::Read).await);
    }
}
