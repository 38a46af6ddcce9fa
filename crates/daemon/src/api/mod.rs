// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback HTTP API for local controllers.
//!
//! Serves engine status, a redacted view of the configuration, a
//! collection mutation endpoint, a live file-event stream, and a reverse
//! proxy to the remote server with the stored token injected. Bound to
//! 127.0.0.1 only; CORS is permissive so browser-based controllers work.

mod proxy;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::supervisor::Supervisor;

/// Build the local API router.
pub fn router(supervisor: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/config", get(get_config))
        .route("/config/collections", put(put_collections))
        .route("/events/local", get(local_events))
        .fallback(proxy::forward)
        .layer(CorsLayer::permissive())
        .with_state(supervisor)
}

/// Bind the loopback listener and serve until cancelled.
pub async fn serve(
    supervisor: Arc<Supervisor>,
    port: u16,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!(port, "local API listening");
    let app = router(supervisor);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

async fn get_status(State(sup): State<Arc<Supervisor>>) -> impl IntoResponse {
    let mut body = match serde_json::to_value(sup.status()) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    body.insert("server_url".into(), json!(sup.server_url()));
    body.insert("username".into(), json!(sup.username()));
    body.insert("uptime_secs".into(), json!(sup.uptime_secs()));
    if let Some(line) = sup.queue_status() {
        body.insert("queue_status".into(), json!(line));
    }
    Json(serde_json::Value::Object(body))
}

/// Configuration view with the token redacted.
async fn get_config(State(sup): State<Arc<Supervisor>>) -> impl IntoResponse {
    let config = sup.current_config();
    Json(json!({
        "server": config.server,
        "username": config.username,
        "collections": config.collections,
    }))
}

#[derive(Debug, Deserialize)]
struct CollectionChange {
    action: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

async fn put_collections(
    State(sup): State<Arc<Supervisor>>,
    Json(change): Json<CollectionChange>,
) -> impl IntoResponse {
    if !sup.config_mutable() {
        return (
            StatusCode::NOT_IMPLEMENTED,
            Json(json!({ "error": "configuration is not writable" })),
        );
    }
    match sup.apply_collection_change(&change.action, change.name.as_deref(), change.path.as_deref())
    {
        Ok(config) => (
            StatusCode::OK,
            Json(json!({ "ok": true, "collections": config.collections })),
        ),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))),
    }
}

/// Live file events from the bus as server-sent events. Starts with a
/// `: connected` comment so clients can confirm the stream is up.
async fn local_events(
    State(sup): State<Arc<Supervisor>>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = sup.bus().subscribe(move |event| {
        let _ = tx.send(event.clone());
    });

    let connected = stream::once(async { Ok(SseEvent::default().comment("connected")) });
    let events = stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        let event = rx.recv().await?;
        let item = SseEvent::default().event("file_changed").json_data(&event);
        let item = match item {
            Ok(item) => Ok(item),
            Err(e) => {
                error!(error = %e, "file event serialization failed");
                Err(e)
            }
        };
        Some((item, (rx, subscription)))
    });

    Sse::new(stream::StreamExt::chain(connected, events)).keep_alive(KeepAlive::default())
}
