/// Request context extractor
///
/// Builds the directory's [`RequestContext`] from the incoming request: the
/// `Host` header, the [`Principal`] left by the principal middleware, and the
/// current time.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::Utc;
use std::convert::Infallible;
use userdir_shared::context::{Principal, RequestContext};

/// Per-request [`RequestContext`]
#[derive(Debug, Clone)]
pub struct RequestCtx(pub RequestContext);

#[async_trait]
impl<S> FromRequestParts<S> for RequestCtx
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut ctx = RequestContext::new(Utc::now());

        if let Some(host) = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
        {
            ctx = ctx.with_host(host);
        }

        if let Some(principal) = parts.extensions.get::<Principal>() {
            ctx = ctx.with_principal(principal.clone());
        }

        Ok(Self(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_collects_host_and_principal() {
        let (mut parts, _) = Request::builder()
            .uri("/v1/me")
            .header(header::HOST, "blog.example.com")
            .body(())
            .unwrap()
            .into_parts();
        parts.extensions.insert(Principal::new("a@example.com"));

        let RequestCtx(ctx) = RequestCtx::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.host.as_deref(), Some("blog.example.com"));
        assert_eq!(ctx.principal, Some(Principal::new("a@example.com")));
    }

    #[tokio::test]
    async fn test_anonymous_request() {
        let (mut parts, _) = Request::builder().uri("/v1/me").body(()).unwrap().into_parts();

        let RequestCtx(ctx) = RequestCtx::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(ctx.host.is_none());
        assert!(!ctx.is_authenticated());
    }
}
