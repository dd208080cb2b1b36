use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinematicdb_core::{
    load_config, load_config_from_env, validate_config, AuthProvider, CollectionBackend,
    CollectionStore, Config, DiscoveryService, FetchOptions, GoTrueClient, QueryCache,
    SqliteCollectionStore, SupabaseCollectionStore, TmdbClient, YtsClient,
};
use cinematicdb_server::api::{create_router, WsBroadcaster};
use cinematicdb_server::state::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// An explicitly configured file must exist; the default one is optional
/// and the environment alone can carry the whole configuration.
fn load() -> Result<Config> {
    match std::env::var("CINEMATICDB_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        Err(_) => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                info!("Loading configuration from {:?}", path);
                load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))
            } else {
                info!("No config file, loading configuration from environment");
                load_config_from_env().context("Failed to load config from environment")
            }
        }
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load()?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Collection backend: {:?}", config.collections.backend);
    info!(
        "Access tokens re-verified every {}s",
        config.session.token_cache_secs
    );

    // Upstream clients
    let metadata =
        Arc::new(TmdbClient::new(config.tmdb.clone()).context("Failed to create TMDB client")?);
    let torrents = Arc::new(YtsClient::new(config.yts.clone()));
    let auth: Arc<dyn AuthProvider> = Arc::new(
        GoTrueClient::new(&config.supabase).context("Failed to create Supabase auth client")?,
    );

    let store: Arc<dyn CollectionStore> = match config.collections.backend {
        CollectionBackend::Supabase => Arc::new(
            SupabaseCollectionStore::new(&config.supabase)
                .context("Failed to create Supabase collection store")?,
        ),
        CollectionBackend::Sqlite => Arc::new(
            SqliteCollectionStore::new(&config.collections.sqlite_path)
                .context("Failed to open collection database")?,
        ),
    };
    info!("Collection store initialized");

    // Query cache
    let cache = Arc::new(QueryCache::new(FetchOptions::from(&config.cache)));
    let gc = cache.spawn_gc_task(Duration::from_secs(config.cache.gc_interval_secs));

    let discovery = DiscoveryService::new(metadata, torrents, Arc::clone(&cache));

    let state = Arc::new(AppState::new(
        config.clone(),
        discovery,
        store,
        auth,
        cache,
        WsBroadcaster::default(),
    ));

    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    gc.abort();

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
