// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-sent-event subscription.
//!
//! Parsing is a small line state machine: field lines accumulate into the
//! pending event, a blank line dispatches it. Only allowlisted event names
//! surface to the consumer; `connected`, `activity`, and keepalive
//! comments are discarded at this layer.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::{FileDeleted, FileUpdated, RemoteEvent};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event name; `message` when the stream omitted the field.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
}

/// Incremental SSE parser. Feed it raw chunks; it yields complete events.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk, returning every event completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseMessage> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        while let Some(nl) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=nl).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if let Some(msg) = self.dispatch() {
                    out.push(msg);
                }
            } else {
                self.field(line);
            }
        }
        out
    }

    fn field(&mut self, line: &str) {
        // Comment lines (keepalives) start with a colon.
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry are not used by this client
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = std::mem::take(&mut self.data);
        if data.is_empty() {
            return None;
        }
        Some(SseMessage { event, data: data.join("\n") })
    }
}

/// Map an allowlisted SSE message to a `RemoteEvent`.
///
/// Returns `None` for discarded names and for payloads that fail to
/// parse (logged, not fatal: the stream continues).
pub(crate) fn map_message(msg: &SseMessage) -> Option<RemoteEvent> {
    match msg.event.as_str() {
        "file_updated" => match serde_json::from_str::<FileUpdated>(&msg.data) {
            Ok(ev) => Some(RemoteEvent::FileUpdated(ev)),
            Err(e) => {
                warn!(error = %e, "discarding malformed file_updated event");
                None
            }
        },
        "file_deleted" => match serde_json::from_str::<FileDeleted>(&msg.data) {
            Ok(ev) => Some(RemoteEvent::FileDeleted(ev)),
            Err(e) => {
                warn!(error = %e, "discarding malformed file_deleted event");
                None
            }
        },
        // connected, activity, keepalive, message: not for us
        _ => None,
    }
}

/// A live event subscription backed by a reconnecting task.
pub struct Subscription {
    rx: mpsc::Receiver<RemoteEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Spawn the reconnect loop. Backoff starts at 1s and doubles to a
    /// 60s cap; a successful connection resets it.
    pub(crate) fn spawn(http: reqwest::Client, url: Url) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;
            loop {
                match connect_once(&http, &url, &tx, &token).await {
                    ConnectOutcome::Cancelled => return,
                    ConnectOutcome::Connected => backoff = INITIAL_BACKOFF,
                    ConnectOutcome::Failed => {}
                }
                debug!(delay_ms = backoff.as_millis() as u64, "event stream reconnect");
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        });
        Self { rx, cancel }
    }

    /// Receive the next remote event; `None` after `close`.
    pub async fn recv(&mut self) -> Option<RemoteEvent> {
        self.rx.recv().await
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum ConnectOutcome {
    /// The stream was established and later ended; backoff resets.
    Connected,
    /// The connection attempt itself failed.
    Failed,
    Cancelled,
}

async fn connect_once(
    http: &reqwest::Client,
    url: &Url,
    tx: &mpsc::Sender<RemoteEvent>,
    token: &CancellationToken,
) -> ConnectOutcome {
    let resp = tokio::select! {
        _ = token.cancelled() => return ConnectOutcome::Cancelled,
        resp = http.get(url.clone()).header("Accept", "text/event-stream").send() => resp,
    };
    let resp = match resp.and_then(|r| r.error_for_status()) {
        Ok(resp) => resp,
        Err(e) => {
            debug!(error = %e, "event stream connect failed");
            return ConnectOutcome::Failed;
        }
    };

    let mut parser = SseParser::new();
    let mut stream = resp.bytes_stream();
    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => return ConnectOutcome::Cancelled,
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for msg in parser.feed(&String::from_utf8_lossy(&bytes)) {
                    if let Some(event) = map_message(&msg) {
                        if tx.send(event).await.is_err() {
                            return ConnectOutcome::Cancelled;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                debug!(error = %e, "event stream broke");
                return ConnectOutcome::Connected;
            }
            None => return ConnectOutcome::Connected,
        }
    }
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
