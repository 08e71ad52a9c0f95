//! Request admission middleware.

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::handlers::ApiError;
use crate::ratelimit::{Decision, RateLimiter};

/// Header carrying an explicit client identifier.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Key used when a request has neither an API key nor a peer address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derive the rate limit key for a request.
///
/// A non-empty `X-API-Key` header wins; otherwise the peer's IP address is
/// used without its port.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());

    match (api_key, peer) {
        (Some(key), _) => key.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

/// Layer that rate limits every request passing through it.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request> for RateLimitService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let limiter = self.limiter.clone();
        // Keep the instance that was polled ready
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let peer = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0);
            let key = client_key(request.headers(), peer);

            match limiter.check(&key).await {
                Decision::Admit => inner.call(request).await,
                Decision::Deny { retry_after_secs } => {
                    Ok(ApiError::TooManyRequests { retry_after_secs }.into_response())
                }
            }
        })
    }
}
