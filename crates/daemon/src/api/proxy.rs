// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse proxy to the remote server.
//!
//! Local controllers talk to `/v1/*` and `/health` without holding the
//! token: the daemon's client injects `Authorization` for them. The
//! upstream exchange is forced to identity encoding, so the body is
//! handed back re-framed and the encoding headers must not be
//! forwarded.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::debug;

use crate::supervisor::Supervisor;

/// Request headers that must not be forwarded upstream.
const SKIP_REQUEST_HEADERS: &[&str] = &["host", "authorization", "accept-encoding", "content-length"];

/// Response headers stripped because the proxy buffers the identity
/// body and re-frames it.
const SKIP_RESPONSE_HEADERS: &[&str] = &["content-encoding", "transfer-encoding", "content-length"];

/// Fallback handler: forward `/v1/*` and `/health` to the remote.
pub(super) async fn forward(State(sup): State<Arc<Supervisor>>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    if !(path.starts_with("/v1/") || path == "/health") {
        return StatusCode::NOT_FOUND.into_response();
    }

    match forward_inner(&sup, req).await {
        Ok(response) => response,
        Err(message) => {
            debug!(path, error = %message, "proxy failure");
            (StatusCode::BAD_GATEWAY, axum::Json(json!({ "error": message }))).into_response()
        }
    }
}

async fn forward_inner(sup: &Arc<Supervisor>, req: Request) -> Result<Response, String> {
    let client = sup.client();
    let path_and_query =
        req.uri().path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_default();
    let target = client
        .server()
        .join(&path_and_query)
        .map_err(|e| format!("bad proxy target: {e}"))?;

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| format!("bad method: {e}"))?;

    // Collect forwardable headers before consuming the body.
    let mut headers = Vec::new();
    for (name, value) in req.headers() {
        let name_str = name.as_str().to_ascii_lowercase();
        if SKIP_REQUEST_HEADERS.contains(&name_str.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            headers.push((name_str, value.to_string()));
        }
    }

    let body = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|e| format!("failed to read request body: {e}"))?;

    // The daemon's client carries the Authorization header. Ask for
    // identity: a caller-set Accept-Encoding disables reqwest's
    // transparent decompression, so compressed codings must not be
    // negotiated here at all.
    let mut upstream = client.http().request(method, target).header("Accept-Encoding", "identity");
    for (name, value) in &headers {
        upstream = upstream.header(name.as_str(), value.as_str());
    }
    if !body.is_empty() {
        upstream = upstream.body(body.to_vec());
    }

    let resp = upstream.send().await.map_err(|e| format!("upstream request failed: {e}"))?;

    let status = StatusCode::from_u16(resp.status().as_u16())
        .map_err(|e| format!("bad upstream status: {e}"))?;
    let mut builder = Response::builder().status(status);
    for (name, value) in resp.headers() {
        let name_str = name.as_str().to_ascii_lowercase();
        if SKIP_RESPONSE_HEADERS.contains(&name_str.as_str()) {
            continue;
        }
        builder = builder.header(name_str.as_str(), value.as_bytes());
    }
    let bytes = resp.bytes().await.map_err(|e| format!("failed to read upstream body: {e}"))?;
    builder.body(Body::from(bytes)).map_err(|e| format!("failed to build response: {e}"))
}
