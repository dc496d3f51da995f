//! WebSocket subscriptions against the in-memory store.

#![allow(clippy::panic)]

mod common;

use std::time::Duration;

use bot_console::config::ConsoleConfig;
use bot_console::domain::{CommandType, Resource, UpdateSource, ViewUpdate};
use bot_console::store::Table;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

use common::{spawn_app, spawn_app_with};

type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(url: &str) -> Socket {
    let Ok((socket, _)) = tokio_tungstenite::connect_async(url).await else {
        panic!("ws connect failed");
    };
    socket
}

async fn send_command(socket: &mut Socket, payload: Value) {
    let msg = json!({
        "id": "req-1",
        "type": "command",
        "timestamp": "2026-01-12T03:00:00Z",
        "payload": payload,
    });
    if socket.send(Message::text(msg.to_string())).await.is_err() {
        panic!("ws send failed");
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_secs(5), socket.next()).await else {
            panic!("no ws message in time");
        };
        if let Message::Text(text) = msg {
            let Ok(value) = serde_json::from_str(text.as_str()) else {
                panic!("ws message is not JSON");
            };
            return value;
        }
    }
}

#[tokio::test]
async fn subscribe_gets_snapshot_then_updates() {
    let app = spawn_app().await;
    let _ = app
        .memory
        .worker_insert(Table::BotLogs, json!({"level": "info", "message": "first"}))
        .await;
    assert!(app.console.refresh(bot_console::domain::Resource::BotLogs).await.is_ok());

    let mut socket = connect(&app.ws_url()).await;
    send_command(&mut socket, json!({"command": "subscribe", "resources": ["bot_logs"]})).await;

    let reply = next_json(&mut socket).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["payload"]["subscribed"], json!(["bot_logs"]));

    let snapshot = next_json(&mut socket).await;
    assert_eq!(snapshot["type"], "event");
    assert_eq!(snapshot["payload"]["view"][0]["message"], "first");

    let _ = app
        .memory
        .worker_insert(Table::BotLogs, json!({"level": "ERROR", "message": "second"}))
        .await;
    let update = next_json(&mut socket).await;
    assert_eq!(update["payload"]["resource"], "bot_logs");
    assert_eq!(update["payload"]["source"], "push");
    assert_eq!(update["payload"]["view"][0]["message"], "second");
    assert_eq!(update["payload"]["view"][0]["level"], "error");
}

#[tokio::test]
async fn updates_for_other_resources_are_filtered() {
    let app = spawn_app().await;
    let mut socket = connect(&app.ws_url()).await;
    send_command(&mut socket, json!({"command": "subscribe", "resources": ["system_stats"]})).await;
    let _ = next_json(&mut socket).await;

    let _ = app
        .memory
        .worker_insert(Table::BotLogs, json!({"level": "info", "message": "ignored"}))
        .await;
    let _ = app
        .memory
        .worker_insert(Table::SystemStats, json!({"cpu_usage": 1.0}))
        .await;

    let update = next_json(&mut socket).await;
    assert_eq!(update["payload"]["resource"], "system_stats");
}

#[tokio::test]
async fn get_state_returns_the_current_view() {
    let app = spawn_app().await;
    let mut socket = connect(&app.ws_url()).await;
    send_command(&mut socket, json!({"command": "get_state", "resource": "active_sessions"})).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["id"], "req-1");
    assert_eq!(reply["payload"]["resource"], "active_sessions");

    send_command(&mut socket, json!({"command": "get_state", "resource": "nope"})).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["type"], "error");
}

#[tokio::test]
async fn lagging_client_is_resent_current_state() {
    let config = ConsoleConfig {
        event_bus_capacity: 2,
        ..ConsoleConfig::default()
    };
    let app = spawn_app_with(config).await;
    let mut socket = connect(&app.ws_url()).await;
    send_command(&mut socket, json!({"command": "subscribe", "resources": ["command_queue"]})).await;
    let _reply = next_json(&mut socket).await;
    let initial = next_json(&mut socket).await;
    assert_eq!(initial["payload"]["view"], json!([]));

    let Ok(handle) = app.console.control_session("7", CommandType::Skip).await else {
        panic!("dispatch failed");
    };
    let id = handle.id().to_string();
    let _ = app
        .memory
        .worker_update(Table::CommandQueue, &id, json!({"status": "completed"}))
        .await;
    assert!(handle.wait_for_outcome(Duration::from_secs(5)).await.is_ok());

    // Overflow the bus before the connection gets to run again.
    for _ in 0..8 {
        app.console.event_bus().publish(ViewUpdate::keyed(
            Resource::CommandQueue,
            "other",
            UpdateSource::Push,
            Value::Null,
        ));
    }

    loop {
        let message = next_json(&mut socket).await;
        let payload = &message["payload"];
        if payload["resource"] != "command_queue" || payload.get("key").is_some() {
            continue;
        }
        let Some(entries) = payload["view"].as_array() else {
            continue;
        };
        if entries
            .iter()
            .any(|e| e["id"] == id.as_str() && e["status"] == "completed")
        {
            break;
        }
    }
}
