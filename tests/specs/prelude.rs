// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the scenario specs: an in-process vault server
//! with request recording, and polling waits.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

/// Upper bound for polling waits in specs.
pub const SPEC_WAIT_MAX_MS: u64 = 15_000;

/// Poll `check` until it returns true or the deadline passes.
pub async fn wait_for(max_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let mut waited = 0;
    while waited <= max_ms {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += 50;
    }
    false
}

/// One request observed by the fake vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultRequest {
    List { prefix: String, authorization: Option<String> },
    Put { path: String, body: String },
    Delete { path: String },
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    origin_mtime: Option<String>,
}

#[derive(Default)]
struct VaultState {
    files: BTreeMap<String, StoredFile>,
    requests: Vec<VaultRequest>,
    /// 401 on /v1/me while set.
    auth_fail: bool,
    /// 503 on every file operation while set (a sick server, which the
    /// queue treats as a transport failure).
    failing: bool,
}

/// In-process stand-in for the remote vault server.
#[derive(Clone)]
pub struct FakeVault {
    url: String,
    state: Arc<Mutex<VaultState>>,
}

impl FakeVault {
    /// Bind an ephemeral loopback port and serve.
    pub async fn spawn() -> Self {
        let state: Arc<Mutex<VaultState>> = Arc::default();
        let app = Router::new()
            .route("/health", get(|| async { StatusCode::OK }))
            .route("/v1/me", get(me))
            .route("/v1/signup", axum::routing::post(signup))
            .route("/v1/contributors", get(list_contributors))
            .route("/v1/contributors/:name", axum::routing::delete(delete_contributor))
            .route("/v1/invites", axum::routing::post(create_invite))
            .route("/v1/events", get(events))
            .route("/v1/files", get(list_files))
            .route(
                "/v1/files/:username/*path",
                get(get_file).put(put_file).delete(delete_file),
            )
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { url: format!("http://{addr}/"), state }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn seed(&self, path: &str, content: &str, origin_mtime: Option<&str>) {
        self.state.lock().files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                origin_mtime: origin_mtime.map(str::to_string),
            },
        );
    }

    pub fn set_auth_fail(&self, fail: bool) {
        self.state.lock().auth_fail = fail;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.state.lock().files.get(path).map(|f| f.content.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    pub fn requests(&self) -> Vec<VaultRequest> {
        self.state.lock().requests.clone()
    }
}

async fn me(State(state): State<Arc<Mutex<VaultState>>>) -> impl IntoResponse {
    if state.lock().auth_fail {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad token" }))).into_response()
    } else {
        Json(json!({ "username": "alice" })).into_response()
    }
}

async fn signup(Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    Json(json!({ "username": body["username"] }))
}

async fn list_contributors() -> impl IntoResponse {
    Json(json!([{ "username": "alice" }, { "username": "bob" }]))
}

async fn delete_contributor(AxumPath(name): AxumPath<String>) -> impl IntoResponse {
    if name == "ghost" {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "no such contributor" }))).into_response()
    } else {
        StatusCode::OK.into_response()
    }
}

async fn create_invite() -> impl IntoResponse {
    Json(json!({ "code": "inv-123" }))
}

/// A short scripted SSE stream: noise the client must discard, then one
/// update and one delete.
async fn events() -> impl IntoResponse {
    let body = concat!(
        ": keepalive\n\n",
        "event: connected\ndata: {}\n\n",
        "event: activity\ndata: {\"id\":9,\"contributor\":\"alice\",\"action\":\"login\",\"created_at\":\"2024-01-01T00:00:00Z\"}\n\n",
        "event: file_updated\ndata: {\"id\":1,\"contributor\":\"alice\",\"path\":\"notes/a.md\",\"size\":3,\"modifiedAt\":\"2024-01-01T00:00:00Z\"}\n\n",
        "event: file_deleted\ndata: {\"id\":2,\"contributor\":\"alice\",\"path\":\"notes/b.md\"}\n\n",
    );
    ([("content-type", "text/event-stream")], body)
}

async fn get_file(
    State(state): State<Arc<Mutex<VaultState>>>,
    AxumPath((_username, path)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    match state.lock().files.get(&path) {
        Some(f) => f.content.clone().into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "no such file" }))).into_response(),
    }
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    prefix: String,
}

async fn list_files(
    State(state): State<Arc<Mutex<VaultState>>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let mut state = state.lock();
    if state.failing {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "sick" })))
            .into_response();
    }
    let authorization =
        headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_string);
    state
        .requests
        .push(VaultRequest::List { prefix: query.prefix.clone(), authorization });
    let now = Utc::now().to_rfc3339();
    let files: Vec<serde_json::Value> = state
        .files
        .iter()
        .filter(|(path, _)| path.starts_with(&query.prefix))
        .map(|(path, f)| {
            json!({
                "path": path,
                "size": f.content.len(),
                "created_at": now,
                "modified_at": now,
                "origin_mtime": f.origin_mtime,
            })
        })
        .collect();
    Json(files).into_response()
}

async fn put_file(
    State(state): State<Arc<Mutex<VaultState>>>,
    AxumPath((_username, path)): AxumPath<(String, String)>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let mut state = state.lock();
    if state.failing {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "sick" })))
            .into_response();
    }
    let origin_mtime =
        headers.get("x-origin-mtime").and_then(|v| v.to_str().ok()).map(str::to_string);
    state.requests.push(VaultRequest::Put { path: path.clone(), body: body.clone() });
    state.files.insert(path, StoredFile { content: body, origin_mtime });
    StatusCode::OK.into_response()
}

async fn delete_file(
    State(state): State<Arc<Mutex<VaultState>>>,
    AxumPath((_username, path)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    let mut state = state.lock();
    if state.failing {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "sick" })))
            .into_response();
    }
    state.requests.push(VaultRequest::Delete { path: path.clone() });
    match state.files.remove(&path) {
        Some(_) => StatusCode::OK.into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "no such file" }))).into_response(),
    }
}
