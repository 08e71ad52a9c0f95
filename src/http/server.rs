//! HTTP server implementation.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, Level};

use crate::error::Result;

/// HTTP server for the rate limited API and the admin endpoints.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The application router
    app: Router,
}

impl HttpServer {
    /// Create a new server for `app`.
    pub fn new(addr: SocketAddr, app: Router) -> Self {
        Self { addr, app }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        let app = self.app.layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    trace::DefaultOnResponse::new()
                        .level(Level::DEBUG)
                        .latency_unit(tower_http::LatencyUnit::Millis),
                ),
        );

        // Peer addresses are needed to key anonymous clients
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::http::{build_app, AppState};
    use crate::ratelimit::{BucketStore, Limit, RateLimiter};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_server_stops_on_signal() {
        let store = Arc::new(BucketStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let limiter = Arc::new(RateLimiter::new(
            store.clone(),
            directory.clone(),
            Limit::new(1, Duration::from_secs(1)),
        ));
        let app = build_app(AppState {
            directory,
            store,
            limiter,
        });

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::new(addr, app);

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
