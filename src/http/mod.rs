//! HTTP surface: admin API, rate limited endpoint and server.

pub mod handlers;
pub mod middleware;
mod server;

pub use middleware::{client_key, RateLimitLayer, RateLimitService, API_KEY_HEADER};
pub use server::HttpServer;

use axum::routing::{any, get, post};
use axum::Router;
use std::sync::Arc;

use crate::directory::ClientDirectory;
use crate::ratelimit::{BucketStore, RateLimiter};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Authoritative client records
    pub directory: Arc<dyn ClientDirectory>,
    /// Bucket registry kept in step with the directory
    pub store: Arc<BucketStore>,
    /// Admission checks for the rate limited routes
    pub limiter: Arc<RateLimiter>,
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/clients", post(handlers::add_client).get(handlers::list_clients))
        .route(
            "/clients/:client_id",
            get(handlers::get_client)
                .put(handlers::update_client)
                .delete(handlers::delete_client),
        )
}

fn limited_routes(limiter: Arc<RateLimiter>) -> Router<AppState> {
    Router::new()
        .route("/api", any(handlers::api))
        .layer(RateLimitLayer::new(limiter))
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

/// Build the full application router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(admin_routes())
        .merge(limited_routes(state.limiter.clone()))
        .merge(health_routes())
        .with_state(state)
}
