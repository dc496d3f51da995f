//! bot-console server entry point.
//!
//! Connects the shared store, starts the console's observations, and serves
//! the REST and WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use bot_console::api;
use bot_console::app_state::AppState;
use bot_console::config::{ConsoleConfig, StoreBackendKind};
use bot_console::domain::EventBus;
use bot_console::feed::PgChangeFeed;
use bot_console::service::ConsoleService;
use bot_console::store::{MemoryStore, PostgresStore, TelemetryStore};
use bot_console::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ConsoleConfig::from_env().map_err(|err| anyhow::anyhow!("{err}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, backend = ?config.store_backend, "starting bot-console");

    // Build store layer
    let store = build_store(&config).await?;

    // Build service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let console = Arc::new(ConsoleService::new(store, &config, event_bus));
    console.start().await;

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(Arc::clone(&console)));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    console.shutdown().await;
    Ok(())
}

async fn build_store(config: &ConsoleConfig) -> anyhow::Result<TelemetryStore> {
    match config.store_backend {
        StoreBackendKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres store backend")?;
            let postgres = PostgresStore::connect(config, url)
                .await
                .context("connecting to the shared store")?;
            if config.run_migrations {
                postgres.run_migrations().await.context("running migrations")?;
                tracing::info!("migrations applied");
            }
            let feed = PgChangeFeed::new(postgres.pool().clone(), config.change_feed_buffer);
            Ok(TelemetryStore::new(Arc::new(postgres), Arc::new(feed)))
        }
        StoreBackendKind::Memory => {
            tracing::warn!("using the in-memory store; nothing is shared with the worker");
            let memory = MemoryStore::new();
            let feed = memory.feed_with_buffer(config.change_feed_buffer);
            Ok(TelemetryStore::new(Arc::new(memory), Arc::new(feed)))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
