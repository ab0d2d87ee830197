//! Strata Permission Server - Main Server

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::{Settings, StorageBackend};
use strata_api::{AppState, SharedStore};
use strata_core::{CachedPermissionStore, Fixture, InMemoryPermissionStore};
use strata_db::PgPermissionStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let settings = Settings::load().context("Failed to load configuration")?;

    info!(
        "Starting Strata Permission Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Configuration loaded successfully");

    let store = initialize_store(&settings).await?;
    let state = AppState::new(store, settings.gate_settings());

    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,strata=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

async fn initialize_store(settings: &Settings) -> Result<SharedStore> {
    let store: SharedStore = match settings.storage.backend {
        StorageBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let store = PgPermissionStore::connect(&settings.database_config())
                .await
                .context("Failed to open PostgreSQL permission store")?;
            info!("PostgreSQL connection established");
            Arc::new(store)
        }
        StorageBackend::Memory => {
            let store = match &settings.storage.fixture {
                Some(path) => {
                    info!("Loading permission fixture from {}", path);
                    let json = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("Failed to read fixture {}", path))?;
                    let fixture = Fixture::from_json(&json)?;
                    InMemoryPermissionStore::from_fixture(fixture)
                        .await
                        .context("Failed to load fixture")?
                }
                None => {
                    warn!("Memory backend started without a fixture; every check will be denied");
                    InMemoryPermissionStore::new()
                }
            };
            Arc::new(store)
        }
    };

    if settings.cache.enabled {
        info!(
            ttl_secs = settings.cache.ttl_secs,
            max_capacity = settings.cache.max_capacity,
            "Permission cache enabled"
        );
        return Ok(Arc::new(CachedPermissionStore::new(
            store,
            settings.cache_config(),
        )));
    }

    Ok(store)
}

fn create_app(state: AppState) -> Router {
    let app = strata_api::create_router(state);

    app.layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
