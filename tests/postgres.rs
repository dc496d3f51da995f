//! Store and change feed against a real PostgreSQL database.
//!
//! Ignored by default. Run with
//! `DATABASE_URL=postgres://... cargo test --test postgres -- --ignored`.

#![allow(clippy::panic)]

use std::time::Duration;

use serde_json::{Value, json};
use uuid::Uuid;

use bot_console::config::ConsoleConfig;
use bot_console::feed::{ChangeEvent, ChangeFeed, ChangeKind, EventMask, PgChangeFeed, Subscription};
use bot_console::store::{PostgresStore, ReadQuery, Row, StoreBackend, Table};

async fn connect() -> Option<PostgresStore> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let Ok(store) = PostgresStore::connect(&ConsoleConfig::default(), &url).await else {
        panic!("could not connect to {url}");
    };
    if let Err(err) = store.run_migrations().await {
        panic!("migrations failed: {err}");
    }
    Some(store)
}

fn row(value: Value) -> Row {
    let Value::Object(row) = value else {
        panic!("not an object");
    };
    row
}

fn text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

/// Waits for the first event whose row satisfies `matches`.
async fn next_matching(sub: &mut Subscription, matches: impl Fn(&Row) -> bool) -> ChangeEvent {
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = sub.next().await {
            if event.row().is_some_and(&matches) {
                return Some(event);
            }
        }
        None
    })
    .await;
    let Ok(Some(event)) = found else {
        panic!("no matching notification");
    };
    event
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn command_rows_round_trip_through_the_query_builder() {
    let Some(store) = connect().await else {
        return;
    };
    let marker = format!("say-{}", Uuid::new_v4());
    let Ok(inserted) = store
        .insert(
            Table::CommandQueue,
            row(json!({
                "command_type": marker,
                "payload": {"guild_id": "g1", "text": "hi"},
                "status": "pending"
            })),
        )
        .await
    else {
        panic!("insert failed");
    };
    let Some(id) = text(&inserted, "id").map(str::to_string) else {
        panic!("no id assigned");
    };
    assert!(inserted.get("created_at").is_some_and(|v| !v.is_null()));
    assert_eq!(inserted.get("payload"), Some(&json!({"guild_id": "g1", "text": "hi"})));

    let query = ReadQuery::new()
        .contains("command_type", marker.to_uppercase())
        .eq("status", "pending")
        .since("created_at", chrono::Utc::now() - chrono::Duration::minutes(5))
        .newest_first("created_at")
        .limit(5);
    let Ok(rows) = store.read(Table::CommandQueue, &query).await else {
        panic!("read failed");
    };
    assert_eq!(rows.len(), 1);

    let Ok(updated) = store
        .update(
            Table::CommandQueue,
            &id,
            row(json!({"status": "completed", "result": "ok"})),
        )
        .await
    else {
        panic!("update failed");
    };
    assert_eq!(text(&updated, "status"), Some("completed"));
    assert_ne!(updated.get("updated_at"), inserted.get("updated_at"));

    let Ok(()) = store.delete(Table::CommandQueue, &id).await else {
        panic!("delete failed");
    };
    let Err(err) = store.delete(Table::CommandQueue, &id).await else {
        panic!("second delete succeeded");
    };
    assert_eq!(err.code.as_deref(), Some("not_found"));

    let missing = Uuid::new_v4().to_string();
    let Err(err) = store
        .update(Table::CommandQueue, &missing, row(json!({"status": "failed"})))
        .await
    else {
        panic!("update of a missing row succeeded");
    };
    assert_eq!(err.code.as_deref(), Some("not_found"));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn listener_delivers_inserts_and_updates() {
    let Some(store) = connect().await else {
        return;
    };
    let feed = PgChangeFeed::new(store.pool().clone(), 64);
    let Ok(mut sub) = feed.subscribe(Table::CommandQueue, EventMask::INSERT_UPDATE).await else {
        panic!("subscribe failed");
    };

    let marker = format!("skip-{}", Uuid::new_v4());
    let Ok(inserted) = store
        .insert(
            Table::CommandQueue,
            row(json!({"command_type": marker, "payload": {"guild_id": "g1"}})),
        )
        .await
    else {
        panic!("insert failed");
    };
    let Some(id) = text(&inserted, "id").map(str::to_string) else {
        panic!("no id assigned");
    };

    let created = next_matching(&mut sub, |r| text(r, "id") == Some(id.as_str())).await;
    assert_eq!(created.kind, ChangeKind::Insert);

    let Ok(_) = store
        .update(Table::CommandQueue, &id, row(json!({"status": "in_progress"})))
        .await
    else {
        panic!("update failed");
    };
    let moved = next_matching(&mut sub, |r| {
        text(r, "id") == Some(id.as_str()) && text(r, "status") == Some("in_progress")
    })
    .await;
    assert_eq!(moved.kind, ChangeKind::Update);
    sub.unsubscribe().await;
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn oversized_rows_are_written_and_re_read_for_listeners() {
    let Some(store) = connect().await else {
        return;
    };
    let feed = PgChangeFeed::new(store.pool().clone(), 64);
    let Ok(mut sub) = feed.subscribe(Table::BotLogs, EventMask::INSERT).await else {
        panic!("subscribe failed");
    };

    let scope = Uuid::new_v4().to_string();
    let message = "x".repeat(9000);
    let Ok(inserted) = store
        .insert(
            Table::BotLogs,
            row(json!({"level": "error", "message": message, "scope": scope})),
        )
        .await
    else {
        panic!("a row larger than a notification payload must still be written");
    };
    assert!(inserted.get("id").is_some());

    let event = next_matching(&mut sub, |r| text(r, "scope") == Some(scope.as_str())).await;
    assert_eq!(event.kind, ChangeKind::Insert);
    let Some(delivered) = event.new_row else {
        panic!("re-read row missing");
    };
    assert_eq!(text(&delivered, "message").map(str::len), Some(9000));
    sub.unsubscribe().await;
}
