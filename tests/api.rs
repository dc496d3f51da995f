//! REST API against the in-memory store.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bot_console::api;
use bot_console::app_state::AppState;
use bot_console::config::ConsoleConfig;
use bot_console::domain::EventBus;
use bot_console::service::ConsoleService;
use bot_console::store::{MemoryStore, Table, TelemetryStore};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{eventually, spawn_app};

async fn get_json(app: &common::TestApp, path: &str) -> (u16, Value) {
    let Ok(response) = app.http.get(app.url(path)).send().await else {
        panic!("GET {path} failed");
    };
    let status = response.status().as_u16();
    let Ok(body) = response.json::<Value>().await else {
        panic!("GET {path} returned no JSON");
    };
    (status, body)
}

#[tokio::test]
async fn health_reports_version() {
    let app = spawn_app().await;
    let (status, body) = get_json(&app, "/api/v1/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

/// Router over a fresh in-memory store, without a listener.
fn router() -> (axum::Router, MemoryStore) {
    let (store, memory) = TelemetryStore::in_memory();
    let console = ConsoleService::new(store, &ConsoleConfig::default(), EventBus::new(16));
    let app = api::build_router().with_state(AppState::new(Arc::new(console)));
    (app, memory)
}

async fn oneshot_json(app: axum::Router, path: &str) -> (StatusCode, Value) {
    let Ok(request) = Request::builder().uri(path).body(Body::empty()) else {
        panic!("bad request");
    };
    let Ok(response) = app.oneshot(request).await else {
        panic!("router failed");
    };
    let status = response.status();
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("unreadable body");
    };
    let Ok(body) = serde_json::from_slice(&bytes) else {
        panic!("body is not JSON");
    };
    (status, body)
}

#[tokio::test]
async fn diagnostics_check_every_table() {
    let (app, memory) = router();
    let _ = memory
        .worker_insert(Table::SystemStats, json!({"cpu_usage": 1.0}))
        .await;
    let (status, body) = oneshot_json(app, "/api/v1/diagnostics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["settings"]["store_backend"], "memory");
    let Some(tables) = body["tables"].as_array() else {
        panic!("expected tables");
    };
    assert_eq!(tables.len(), 8);
    assert!(
        tables
            .iter()
            .any(|t| t["table"] == "system_stats" && t["sample_rows"] == 1)
    );
}

#[tokio::test]
async fn diagnostics_report_store_outage() {
    let (app, memory) = router();
    memory.set_unavailable(true);
    let (status, body) = oneshot_json(app, "/api/v1/diagnostics").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["healthy"], false);
    assert_eq!(body["tables"][0]["ok"], false);
    assert_eq!(body["tables"][0]["code"], "unavailable");
}

#[tokio::test]
async fn resources_list_poll_intervals() {
    let app = spawn_app().await;
    let (_, body) = get_json(&app, "/api/v1/resources").await;
    let Some(list) = body.as_array() else {
        panic!("expected array");
    };
    assert_eq!(list.len(), 9);
    assert!(list.iter().any(|r| r["resource"] == "analytics" && r["pushed"] == false));
}

#[tokio::test]
async fn worker_stats_reach_the_api() {
    let app = spawn_app().await;
    let _ = app
        .memory
        .worker_insert(Table::SystemStats, json!({"cpu_usage": 3.5, "guild_count": 12}))
        .await;

    let app = &app;
    assert!(
        eventually(move || async move {
            let (_, body) = get_json(app, "/api/v1/stats/latest").await;
            body["guild_count"] == 12
        })
        .await
    );
}

#[tokio::test]
async fn sessions_include_progress() {
    let app = spawn_app().await;
    let _ = app
        .memory
        .worker_upsert(
            Table::ActiveSessions,
            json!({"guild_id": "g1", "position_ms": 30_000, "duration_ms": 0}),
        )
        .await;

    let app = &app;
    assert!(
        eventually(move || async move {
            let (_, body) = get_json(app, "/api/v1/sessions").await;
            body[0]["guild_id"] == "g1" && body[0]["progress_percent"] == 0.0
        })
        .await
    );
}

#[tokio::test]
async fn dispatch_creates_one_pending_entry() {
    let app = spawn_app().await;
    let Ok(response) = app
        .http
        .post(app.url("/api/v1/commands"))
        .json(&json!({"command_type": "volume", "payload": {"guild_id": "g1", "level": 40}}))
        .send()
        .await
    else {
        panic!("POST failed");
    };
    assert_eq!(response.status().as_u16(), 202);
    let Ok(body) = response.json::<Value>().await else {
        panic!("no JSON");
    };
    assert_eq!(body["entry"]["status"], "pending");
    assert_eq!(body["entry"]["payload"]["level"], 40);

    let Some(id) = body["command_id"].as_str() else {
        panic!("missing id");
    };
    let (status, entry) = get_json(&app, &format!("/api/v1/commands/{id}")).await;
    assert_eq!(status, 200);
    assert_eq!(entry["status"], "pending");
    assert_eq!(app.memory.row_count(Table::CommandQueue).await, 1);
}

#[tokio::test]
async fn dispatch_without_guild_is_rejected() {
    let app = spawn_app().await;
    let Ok(response) = app
        .http
        .post(app.url("/api/v1/commands"))
        .json(&json!({"command_type": "skip", "payload": {}}))
        .send()
        .await
    else {
        panic!("POST failed");
    };
    assert_eq!(response.status().as_u16(), 400);
    let Ok(body) = response.json::<Value>().await else {
        panic!("no JSON");
    };
    assert_eq!(body["error"]["code"], 1002);
    assert_eq!(app.memory.row_count(Table::CommandQueue).await, 0);
}

#[tokio::test]
async fn dispatch_during_outage_is_not_sent() {
    let app = spawn_app().await;
    app.memory.set_unavailable(true);
    let Ok(response) = app
        .http
        .post(app.url("/api/v1/sessions/g1/pause"))
        .send()
        .await
    else {
        panic!("POST failed");
    };
    assert_eq!(response.status().as_u16(), 503);
}

#[tokio::test]
async fn session_control_waits_for_the_worker() {
    let app = spawn_app().await;
    let memory = app.memory.clone();
    tokio::spawn(async move {
        for _ in 0..100 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let Ok(rows) = bot_console::store::StoreBackend::read(
                &memory,
                Table::CommandQueue,
                &bot_console::store::ReadQuery::new(),
            )
            .await
            else {
                continue;
            };
            if let Some(id) = rows.first().and_then(|r| r.get("id")).and_then(Value::as_str) {
                let _ = memory
                    .worker_update(Table::CommandQueue, id, json!({"status": "failed", "error": "not in voice"}))
                    .await;
                return;
            }
        }
    });

    let Ok(response) = app
        .http
        .post(app.url("/api/v1/sessions/g1/skip?wait_secs=5"))
        .send()
        .await
    else {
        panic!("POST failed");
    };
    assert_eq!(response.status().as_u16(), 200);
    let Ok(body) = response.json::<Value>().await else {
        panic!("no JSON");
    };
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"], "not in voice");
}

#[tokio::test]
async fn unknown_session_action_is_rejected() {
    let app = spawn_app().await;
    let Ok(response) = app
        .http
        .post(app.url("/api/v1/sessions/g1/explode"))
        .send()
        .await
    else {
        panic!("POST failed");
    };
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn malformed_command_id_is_a_bad_request() {
    let app = spawn_app().await;
    let (status, body) = get_json(&app, "/api/v1/commands/not-a-uuid").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], 1001);
}

#[tokio::test]
async fn playlist_crud_round_trip() {
    let app = spawn_app().await;
    let Ok(playlist) = app
        .memory
        .worker_insert(Table::Playlists, json!({"user_id": "u-1", "playlist_name": "Night"}))
        .await
    else {
        panic!("seed failed");
    };
    let Some(id) = playlist.get("id").and_then(Value::as_str).map(str::to_string) else {
        panic!("no id");
    };

    let Ok(added) = app
        .http
        .post(app.url(&format!("/api/v1/playlists/{id}/tracks")))
        .json(&json!({"track_title": "Lemon", "track_url": "https://example.com/lemon"}))
        .send()
        .await
    else {
        panic!("POST failed");
    };
    assert_eq!(added.status().as_u16(), 201);

    let Ok(renamed) = app
        .http
        .patch(app.url(&format!("/api/v1/playlists/{id}")))
        .json(&json!({"playlist_name": "Late night"}))
        .send()
        .await
    else {
        panic!("PATCH failed");
    };
    assert_eq!(renamed.status().as_u16(), 200);

    let (_, listed) = get_json(&app, "/api/v1/playlists?user=U-1").await;
    assert_eq!(listed[0]["playlist_name"], "Late night");
    assert_eq!(listed[0]["tracks"][0]["added_by"], "Admin");

    let Ok(deleted) = app
        .http
        .delete(app.url(&format!("/api/v1/playlists/{id}")))
        .send()
        .await
    else {
        panic!("DELETE failed");
    };
    assert_eq!(deleted.status().as_u16(), 204);
    assert_eq!(app.memory.row_count(Table::PlaylistTracks).await, 0);
}

#[tokio::test]
async fn infra_without_credentials_is_500() {
    let app = spawn_app().await;
    let (status, body) = get_json(&app, "/api/v1/infra/status").await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], 3003);
}

#[tokio::test]
async fn analytics_summarises_usage_and_tracks() {
    let app = spawn_app().await;
    for total in [5, 7] {
        let _ = app
            .memory
            .worker_insert(Table::GeminiUsage, json!({"total_tokens": total, "prompt_tokens": 1}))
            .await;
    }
    for title in ["Idol", "Idol", "Lemon"] {
        let _ = app
            .memory
            .worker_insert(Table::MusicHistory, json!({"track_title": title}))
            .await;
    }
    let (_, top) = get_json(&app, "/api/v1/analytics/top-tracks?limit=1").await;
    assert_eq!(top, json!([{"key": "Idol", "count": 2}]));

    let (_, days) = get_json(&app, "/api/v1/analytics/usage-by-day?days=1").await;
    assert_eq!(days[0]["count"], 2);
    assert_eq!(days[0]["sums"]["total_tokens"], 12);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = spawn_app().await;
    let (status, body) = get_json(&app, "/api-docs/openapi.json").await;
    assert_eq!(status, 200);
    assert!(body["paths"]["/api/v1/commands"].is_object());
}
