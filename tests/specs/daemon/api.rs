// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local API contract: status, redacted config, collection mutations,
//! and the authenticated reverse proxy.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use sv_client::{ApiClient, FakeRemote, RemoteApi};
use sv_config::Config;
use sv_core::Collection;
use sv_daemon::api;
use sv_daemon::lifecycle::DaemonPaths;
use sv_daemon::stream::ChangeStream;
use sv_daemon::supervisor::{Supervisor, SupervisorConfig};

use crate::prelude::*;

struct ApiRig {
    supervisor: Arc<Supervisor>,
    _config_dir: tempfile::TempDir,
}

fn rig_with_server(server_url: &str, mutable_config: bool) -> ApiRig {
    let config_dir = tempfile::tempdir().expect("config dir");
    let paths = DaemonPaths::in_dir(config_dir.path());
    let mut cfg = SupervisorConfig::for_paths(paths.clone());
    cfg.health_interval = Duration::from_secs(5);
    cfg.mutable_config = mutable_config;

    let collection_dir = config_dir.path().join("notes");
    std::fs::create_dir_all(&collection_dir).expect("collection dir");
    let config = Config {
        server: server_url.to_string(),
        token: "spec-token".into(),
        username: "alice".into(),
        collections: vec![Collection::new("notes", &collection_dir)],
    };
    config.save(&paths.config_path).expect("save config");

    let remote = FakeRemote::new("alice");
    let client = ApiClient::new(server_url, "spec-token").expect("client");
    let stream = Arc::new(ChangeStream::bind(&paths.socket_path).expect("bind socket"));
    let lock_file = std::fs::File::create(&paths.pid_path).expect("pid file");
    let supervisor = Supervisor::new(
        cfg,
        config,
        client,
        Arc::new(remote) as Arc<dyn RemoteApi>,
        stream,
        lock_file,
    );
    ApiRig { supervisor, _config_dir: config_dir }
}

fn rig() -> ApiRig {
    rig_with_server("http://127.0.0.1:1/", true)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn status_reports_engine_state() {
    let r = rig();
    let app = api::router(Arc::clone(&r.supervisor));
    let response = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["running"], serde_json::json!(true));
    assert_eq!(body["username"], serde_json::json!("alice"));
    assert_eq!(body["collections_watched"], serde_json::json!(1));
    assert!(body["server_url"].as_str().is_some());
    assert!(body["uptime_secs"].as_u64().is_some());
}

#[tokio::test]
async fn config_is_served_with_token_redacted() {
    let r = rig();
    let app = api::router(Arc::clone(&r.supervisor));
    let response = app
        .oneshot(Request::builder().uri("/config").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body.get("token").is_none(), "token must not be served: {body}");
    assert_eq!(body["username"], serde_json::json!("alice"));
    assert_eq!(body["collections"].as_array().map(Vec::len), Some(1));
}

async fn put_collections(app: axum::Router, payload: serde_json::Value) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method("PUT")
            .uri("/config/collections")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request"),
    )
    .await
    .expect("response")
}

#[tokio::test]
async fn collection_changes_validate_and_persist() {
    let r = rig();

    let bad_action = put_collections(
        api::router(Arc::clone(&r.supervisor)),
        serde_json::json!({ "action": "frobnicate" }),
    )
    .await;
    assert_eq!(bad_action.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(bad_action).await["error"].as_str().is_some());

    let missing_path = put_collections(
        api::router(Arc::clone(&r.supervisor)),
        serde_json::json!({ "action": "add" }),
    )
    .await;
    assert_eq!(missing_path.status(), StatusCode::BAD_REQUEST);

    let extra = tempfile::tempdir().expect("dir");
    let ok = put_collections(
        api::router(Arc::clone(&r.supervisor)),
        serde_json::json!({
            "action": "add",
            "name": "extra",
            "path": extra.path().to_string_lossy(),
        }),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let body = body_json(ok).await;
    assert_eq!(body["ok"], serde_json::json!(true));
    assert_eq!(body["collections"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn immutable_config_answers_501() {
    let r = rig_with_server("http://127.0.0.1:1/", false);
    let response = put_collections(
        api::router(Arc::clone(&r.supervisor)),
        serde_json::json!({ "action": "add", "path": "/tmp/x" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn unknown_local_paths_are_404() {
    let r = rig();
    let app = api::router(Arc::clone(&r.supervisor));
    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn proxy_injects_the_stored_token() {
    let vault = FakeVault::spawn().await;
    let r = rig_with_server(vault.url(), true);
    let app = api::router(Arc::clone(&r.supervisor));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/files?prefix=notes/")
                .header("host", "localhost:8787")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let listed = vault
        .requests()
        .into_iter()
        .find_map(|req| match req {
            VaultRequest::List { prefix, authorization } => Some((prefix, authorization)),
            _ => None,
        })
        .expect("vault saw the proxied list");
    assert_eq!(listed.0, "notes/");
    assert_eq!(listed.1.as_deref(), Some("Bearer spec-token"));
}

#[tokio::test]
async fn proxy_failure_maps_to_502() {
    // Nothing listens on port 1.
    let r = rig();
    let app = api::router(Arc::clone(&r.supervisor));
    let response = app
        .oneshot(Request::builder().uri("/v1/files").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(body_json(response).await["error"].as_str().is_some());
}

#[tokio::test]
async fn cors_preflight_is_permitted() {
    let r = rig();
    let app = api::router(Arc::clone(&r.supervisor));
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/status")
                .header("origin", "http://localhost:5173")
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert!(response.status().is_success());
    assert!(
        response.headers().contains_key("access-control-allow-origin"),
        "preflight must allow all origins"
    );
}
