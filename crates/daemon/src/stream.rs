// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-domain-socket change stream.
//!
//! One socket in the per-user config directory; every live connection
//! receives newline-delimited JSON change records. There is no backlog
//! or replay: a consumer sees only what happens while it is connected.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use sv_core::{Collection, FileEvent, FileEventKind};

/// Kind of change carried on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamAction {
    FileWrite,
    FileDelete,
    /// A whole collection disappeared from the remote (purged after
    /// removal from the configuration).
    DirDelete,
}

/// One NDJSON record on the change stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub action: StreamAction,
    pub path: String,
    pub collection: String,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    pub fn from_file_event(event: &FileEvent, timestamp: DateTime<Utc>) -> Self {
        let action = match event.kind {
            FileEventKind::Added | FileEventKind::Changed => StreamAction::FileWrite,
            FileEventKind::Removed => StreamAction::FileDelete,
        };
        Self {
            action,
            path: event.server_path.as_str().to_string(),
            collection: event.server_path.collection().to_string(),
            timestamp,
        }
    }

    pub fn dir_delete(collection: &Collection, timestamp: DateTime<Utc>) -> Self {
        Self {
            action: StreamAction::DirDelete,
            path: collection.name.clone(),
            collection: collection.name.clone(),
            timestamp,
        }
    }
}

/// Broadcast publisher behind the Unix socket.
pub struct ChangeStream {
    tx: broadcast::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl ChangeStream {
    /// Remove a stale socket file, bind, and start accepting.
    pub fn bind(path: &Path) -> std::io::Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        let (tx, _) = broadcast::channel(64);
        let cancel = CancellationToken::new();

        let accept_tx = tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            let rx = accept_tx.subscribe();
                            let conn_token = token.clone();
                            tokio::spawn(async move {
                                serve_connection(stream, rx, conn_token).await;
                            });
                        }
                        Err(e) => error!(error = %e, "change stream accept error"),
                    }
                }
            }
        });

        Ok(Self { tx, cancel })
    }

    /// Broadcast one record to every live connection. A send with no
    /// connected consumers is not an error.
    pub fn publish(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve_connection(
    mut stream: UnixStream,
    mut rx: broadcast::Receiver<StreamEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            received = rx.recv() => match received {
                Ok(event) => event,
                // No backlog: a slow consumer skips what it missed.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "change stream consumer lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        };
        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "change stream serialization failed");
                continue;
            }
        };
        line.push(b'\n');
        if stream.write_all(&line).await.is_err() {
            // Consumer went away.
            return;
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
