//! Extract the current tenant set by the tenant interceptor.

use crate::tenant::current_tenant;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Tenant of the request being handled; `"default"` when the request named none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentTenant(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(_parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentTenant(current_tenant()))
    }
}
