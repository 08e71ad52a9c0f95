use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{LogFormat, TurnstileConfig};
use turnstile::directory::{ClientDirectory, MemoryDirectory};
use turnstile::http::{build_app, AppState, HttpServer};
use turnstile::ratelimit::{BucketStore, RateLimiter};

/// Per-client token bucket rate limiting service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the listen address
    #[arg(long)]
    address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(&args.config)?;
    if let Some(address) = args.address {
        config.server.address = address;
    }

    init_tracing(&config);

    info!("Starting Turnstile Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(address = %config.server.address, "Configuration loaded");

    let directory = Arc::new(MemoryDirectory::from_records(config.client_records()));
    let store = Arc::new(BucketStore::new());

    // Known clients get their buckets up front
    match directory.list().await {
        Ok(clients) => {
            for client in clients {
                info!(
                    key = %client.key,
                    capacity = client.capacity,
                    refill_rate_seconds = client.refill_rate_seconds,
                    unlimited = client.unlimited,
                    "Loading client into bucket store"
                );
                store.set(&client.key, store.new_bucket(client.limit()));
            }
        }
        Err(e) => warn!(error = %e, "Failed to list clients"),
    }

    let refill = store.spawn_refill(config.refill_tick());

    let limiter = Arc::new(RateLimiter::new(
        store.clone(),
        directory.clone(),
        config.default_limit(),
    ));
    info!(
        capacity = limiter.default_limit().capacity,
        refill_interval = ?limiter.default_limit().refill_interval,
        "Rate limiter initialized"
    );

    let app = build_app(AppState {
        directory,
        store,
        limiter,
    });

    let server = HttpServer::new(config.server.address, app);
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    refill.shutdown().await;
    result?;

    info!("Turnstile Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(config: &TurnstileConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
