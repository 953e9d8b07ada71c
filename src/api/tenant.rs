use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderName};

use crate::api::errors::ApiError;
use crate::core::tenant::TenantId;

pub(crate) const TENANT_HEADER: HeaderName = HeaderName::from_static("x-tenant-id");

/// The school a request acts for, resolved once from `X-Tenant-Id`.
pub(crate) struct TenantContext(pub(crate) TenantId);

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(&TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let tenant = TenantId::parse(raw)?;
        Ok(TenantContext(tenant))
    }
}
