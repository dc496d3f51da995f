//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered view updates.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::{SubscriptionManager, parse_resources};
use crate::domain::{Resource, ViewUpdate};
use crate::service::ConsoleService;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and answers them, followed by the
///   current snapshot of every newly subscribed resource.
/// - Forwards matching updates from the [`broadcast::Receiver`]. A client
///   that lags behind the bus is resent snapshots of everything it is
///   subscribed to, since the updates it missed are gone.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<ViewUpdate>,
    console: Arc<ConsoleService>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    'conn: loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = handle_text_message(&text, &mut subs, &console).await;
                        for reply in replies {
                            let Ok(json) = serde_json::to_string(&reply) else {
                                continue;
                            };
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(update) => {
                        if subs.matches(update.resource) {
                            let Some(json) = event_message(&update) else {
                                continue;
                            };
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus, resending snapshots");
                        for message in snapshots(&console, &subs.subscribed()).await {
                            let Ok(json) = serde_json::to_string(&message) else {
                                continue;
                            };
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

fn event_message(update: &ViewUpdate) -> Option<String> {
    let payload = serde_json::to_value(update).ok()?;
    let msg = WsMessage::new(uuid::Uuid::new_v4().to_string(), WsMessageType::Event, payload);
    serde_json::to_string(&msg).ok()
}

async fn snapshots(console: &ConsoleService, resources: &[Resource]) -> Vec<WsMessage> {
    let mut out = Vec::new();
    for resource in resources {
        if let Some(update) = console.snapshot(*resource).await
            && let Ok(payload) = serde_json::to_value(&update)
        {
            out.push(WsMessage::new(
                uuid::Uuid::new_v4().to_string(),
                WsMessageType::Event,
                payload,
            ));
        }
    }
    out
}

/// Handles a text message from the client, returning the replies in send
/// order.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    console: &ConsoleService,
) -> Vec<WsMessage> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return vec![WsMessage::error("", 400, "malformed JSON")];
    };
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return vec![WsMessage::error(msg.id, 404, "unknown command")];
    };

    match command {
        WsCommand::Subscribe { resources } => {
            let (resources, wildcard, unknown) = parse_resources(&resources);
            let fresh = subs.subscribe(&resources, wildcard);
            let mut replies = vec![WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": subs.subscribed(),
                    "wildcard": subs.is_subscribed_all(),
                    "unknown": unknown,
                }),
            )];
            replies.extend(snapshots(console, &fresh).await);
            replies
        }
        WsCommand::Unsubscribe { resources } => {
            let (resources, wildcard, unknown) = parse_resources(&resources);
            subs.unsubscribe(&resources, wildcard);
            vec![WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": subs.subscribed(),
                    "unknown": unknown,
                }),
            )]
        }
        WsCommand::GetState { resource } => {
            let Ok(resource) = resource.parse::<Resource>() else {
                return vec![WsMessage::error(msg.id, 404, "unknown resource")];
            };
            let view = console.snapshot(resource).await.map(|u| u.view);
            vec![WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({ "resource": resource, "view": view }),
            )]
        }
    }
}
