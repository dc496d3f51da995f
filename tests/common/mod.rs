//! Shared helpers: a console over the in-memory store served on a random
//! local port.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use bot_console::api;
use bot_console::app_state::AppState;
use bot_console::config::ConsoleConfig;
use bot_console::domain::EventBus;
use bot_console::service::ConsoleService;
use bot_console::store::{MemoryStore, TelemetryStore};
use bot_console::ws::handler::ws_handler;

/// A running console and the worker side of its store.
pub struct TestApp {
    pub addr: std::net::SocketAddr,
    pub console: Arc<ConsoleService>,
    pub memory: MemoryStore,
    pub http: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(ConsoleConfig::default()).await
}

pub async fn spawn_app_with(config: ConsoleConfig) -> TestApp {
    let (store, memory) = TelemetryStore::in_memory();
    let console = Arc::new(ConsoleService::new(
        store,
        &config,
        EventBus::new(config.event_bus_capacity),
    ));
    console.start().await;

    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .with_state(AppState::new(Arc::clone(&console)));

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestApp {
        addr,
        console,
        memory,
        http: reqwest::Client::new(),
    }
}

/// Polls `check` every 20 ms until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    false
}
