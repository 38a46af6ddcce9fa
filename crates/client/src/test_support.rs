// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake remote store for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::error::ClientError;
use crate::remote::RemoteApi;
use crate::types::{Me, Origin, RemoteFile};

/// Recorded call to FakeRemote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    List { prefix: String },
    Put { path: String, content: String, origin_ctime: Option<String>, origin_mtime: Option<String> },
    Delete { path: String },
}

/// Fake remote store for testing
///
/// Allows programmatic control over server behavior and records all
/// file operations in arrival order.
#[derive(Clone)]
pub struct FakeRemote {
    inner: Arc<Mutex<FakeState>>,
}

struct FakeState {
    username: String,
    files: BTreeMap<String, FakeFile>,
    ops: Vec<RecordedOp>,
    reachable: bool,
    /// Status code to fail the next operations on a given path with.
    fail_status: BTreeMap<String, u16>,
    /// Fail every mutation with a transport error while set.
    down: bool,
}

struct FakeFile {
    content: String,
    origin_mtime: Option<DateTime<Utc>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new("fake-user")
    }
}

impl FakeRemote {
    pub fn new(username: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                username: username.to_string(),
                files: BTreeMap::new(),
                ops: Vec::new(),
                reachable: true,
                fail_status: BTreeMap::new(),
                down: false,
            })),
        }
    }

    /// Seed a file into the fake server state.
    pub fn seed_file(&self, path: &str, content: &str, origin_mtime_ms: Option<u64>) {
        let origin_mtime =
            origin_mtime_ms.and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single());
        self.inner.lock().files.insert(
            path.to_string(),
            FakeFile { content: content.to_string(), origin_mtime },
        );
    }

    /// Simulate a network partition: every request fails with a
    /// transport error while down.
    pub fn set_down(&self, down: bool) {
        let mut state = self.inner.lock();
        state.down = down;
        state.reachable = !down;
    }

    /// Fail mutations on `path` with the given HTTP status.
    pub fn fail_path(&self, path: &str, status: u16) {
        self.inner.lock().fail_status.insert(path.to_string(), status);
    }

    pub fn clear_failures(&self) {
        let mut state = self.inner.lock();
        state.fail_status.clear();
        state.down = false;
        state.reachable = true;
    }

    /// All recorded file operations, in order.
    pub fn ops(&self) -> Vec<RecordedOp> {
        self.inner.lock().ops.clone()
    }

    /// Paths currently stored on the fake server.
    pub fn paths(&self) -> Vec<String> {
        self.inner.lock().files.keys().cloned().collect()
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.inner.lock().files.get(path).map(|f| f.content.clone())
    }

    fn gate(state: &FakeState, path: &str) -> Result<(), ClientError> {
        if state.down {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        if let Some(status) = state.fail_status.get(path) {
            return Err(ClientError::Api { status: *status, message: "rejected".to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn health(&self) -> bool {
        self.inner.lock().reachable
    }

    async fn me(&self) -> Result<Me, ClientError> {
        let state = self.inner.lock();
        if state.down {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        Ok(Me { username: state.username.clone() })
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<RemoteFile>, ClientError> {
        let mut state = self.inner.lock();
        if state.down {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        state.ops.push(RecordedOp::List { prefix: prefix.to_string() });
        let epoch = Utc.timestamp_millis_opt(0).single().unwrap_or_else(Utc::now);
        Ok(state
            .files
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, f)| RemoteFile {
                path: path.clone(),
                size: f.content.len() as u64,
                created_at: epoch,
                modified_at: f.origin_mtime.unwrap_or(epoch),
                origin_mtime: f.origin_mtime,
            })
            .collect())
    }

    async fn put_file(
        &self,
        _username: &str,
        path: &str,
        content: &[u8],
        origin: &Origin,
    ) -> Result<(), ClientError> {
        let mut state = self.inner.lock();
        Self::gate(&state, path)?;
        let content = String::from_utf8_lossy(content).into_owned();
        state.ops.push(RecordedOp::Put {
            path: path.to_string(),
            content: content.clone(),
            origin_ctime: origin.ctime.clone(),
            origin_mtime: origin.mtime.clone(),
        });
        let origin_mtime = origin
            .mtime
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        state.files.insert(path.to_string(), FakeFile { content, origin_mtime });
        Ok(())
    }

    async fn delete_file(&self, _username: &str, path: &str) -> Result<(), ClientError> {
        let mut state = self.inner.lock();
        Self::gate(&state, path)?;
        state.ops.push(RecordedOp::Delete { path: path.to_string() });
        state.files.remove(path);
        Ok(())
    }
}
