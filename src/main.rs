//! Flipbook Server
//!
//! Serves the flipbook shell through the offline cache and renders pages of
//! the persisted PDF on demand.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flipbook_offline::config::Config;
use flipbook_offline::offline::{
    FsCacheStorage, NetworkFetcher, OfflineCache, Registration, ReqwestFetcher, Scope,
};
use flipbook_offline::render::{MupdfProvider, PageRenderCache};
use flipbook_offline::routes;
use flipbook_offline::state::AppState;
use flipbook_offline::storage::FsBlobStore;
use flipbook_offline::viewer::Viewer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flipbook_offline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Flipbook Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Upstream: {}", config.offline.upstream);
    tracing::info!("Cache version: {}", config.offline.version);

    // Offline cache
    let scope = Scope::new(config.offline.scope_url()?)?;
    let fetcher: Arc<dyn NetworkFetcher> = Arc::new(
        ReqwestFetcher::new(scope.root().clone(), config.offline.fetch_timeout)
            .context("Failed to build HTTP client")?,
    );
    let storage = Arc::new(FsCacheStorage::new(&config.offline.cache_dir));
    let registration = Arc::new(Registration::new(fetcher.clone()));
    let cache = Arc::new(OfflineCache::new(
        config.offline.version.clone(),
        scope,
        fetcher,
        storage,
    ));
    match registration.register(cache).await {
        Ok(report) => tracing::info!(
            cached = report.cached,
            failed = report.failed.len(),
            "Offline cache {} active",
            report.version
        ),
        Err(e) => tracing::warn!("Offline cache install failed: {}. Proxying without cache", e),
    }

    // Viewer session
    let pages = PageRenderCache::new(Arc::new(MupdfProvider::new()), config.render.clone());
    let viewer = Viewer::new(Arc::new(FsBlobStore::new(&config.store.dir)), pages);
    match viewer.restore().await {
        Ok(Some(total_pages)) => tracing::info!("Restored stored document with {} pages", total_pages),
        Ok(None) => tracing::info!("No stored document"),
        Err(e) => tracing::warn!("Failed to restore stored document: {}", e),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid SERVER_HOST/SERVER_PORT")?;

    let app = routes::app(AppState::new(config, viewer, registration));

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Flipbook Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
