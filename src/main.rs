//! tiercache server - HTTP front-end over the cache
//!
//! Serves a `Cache<serde_json::Value>` over a small REST API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiercache::api::create_router;
use tiercache::{AppState, Config, DurableStorage, FileStorage, TokioScheduler};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Open the cache, reloading the snapshot when `SNAPSHOT_DIR` is set
/// 4. Start the periodic expiry sweeper
/// 5. Serve the router until SIGINT/SIGTERM, then flush the mirror
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiercache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tiercache server");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: memory_budget={}B, default_ttl={}ms, port={}, sweep_interval={}ms",
        config.memory_budget, config.default_ttl_ms, config.server_port, config.sweep_interval_ms
    );

    let storage: Option<Arc<dyn DurableStorage>> = match &config.snapshot_dir {
        Some(dir) => {
            info!("Mirroring persistent entries to {}", dir.display());
            Some(Arc::new(FileStorage::new(dir.clone())))
        }
        None => {
            warn!("SNAPSHOT_DIR not set; running memory-only");
            None
        }
    };

    let port = config.server_port;
    let state = AppState::open(config, storage)
        .await
        .context("failed to open cache")?;
    state.cache.start_sweeper(&TokioScheduler);

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.cache.destroy();
    state.cache.flush().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
