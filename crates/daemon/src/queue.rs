// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO retry queue for pending network operations.
//!
//! A single worker drains the queue head-first. Semantic failures (4xx)
//! drop the operation; transport failures keep it and back off
//! exponentially, 1s doubling to a 60s cap, reset by the next success.
//! Single-worker FIFO is what gives per-path ordering: a Put enqueued
//! before a Delete for the same path executes before it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sv_client::{ClientError, Origin, RemoteApi};
use sv_core::ServerPath;

/// Worker backoff bounds.
#[derive(Debug, Clone, Copy)]
pub struct QueueTuning {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for QueueTuning {
    fn default() -> Self {
        Self { initial_backoff: Duration::from_secs(1), max_backoff: Duration::from_secs(60) }
    }
}

/// A pending network operation. Content stays in memory until the
/// operation completes or the owning syncer is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedOp {
    Put {
        username: String,
        server_path: ServerPath,
        content: Vec<u8>,
        origin_ctime: Option<String>,
        origin_mtime: Option<String>,
        enqueued_at_ms: u64,
    },
    Delete {
        username: String,
        server_path: ServerPath,
        enqueued_at_ms: u64,
    },
}

impl QueuedOp {
    pub fn server_path(&self) -> &ServerPath {
        match self {
            Self::Put { server_path, .. } | Self::Delete { server_path, .. } => server_path,
        }
    }

    /// Short human-readable form for status lines: `put notes/a.md`.
    pub fn describe(&self) -> String {
        match self {
            Self::Put { server_path, .. } => format!("put {server_path}"),
            Self::Delete { server_path, .. } => format!("delete {server_path}"),
        }
    }
}

/// Callback for human-readable queue status lines.
pub type StatusFn = Arc<dyn Fn(&str) + Send + Sync>;

struct QueueInner {
    ops: Mutex<VecDeque<QueuedOp>>,
    remote: Arc<dyn RemoteApi>,
    tuning: QueueTuning,
    backoff: Mutex<Duration>,
    wake: Notify,
    cancel: CancellationToken,
    on_status: StatusFn,
}

/// FIFO queue of pending operations with one worker task. Cheap to clone;
/// clones share the same queue.
#[derive(Clone)]
pub struct RetryQueue {
    inner: Arc<QueueInner>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RetryQueue {
    pub fn new(remote: Arc<dyn RemoteApi>, on_status: StatusFn) -> Self {
        Self::with_tuning(remote, on_status, QueueTuning::default())
    }

    pub fn with_tuning(remote: Arc<dyn RemoteApi>, on_status: StatusFn, tuning: QueueTuning) -> Self {
        let inner = Arc::new(QueueInner {
            ops: Mutex::new(VecDeque::new()),
            remote,
            backoff: Mutex::new(tuning.initial_backoff),
            tuning,
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            on_status,
        });
        let worker = tokio::spawn(worker_loop(Arc::clone(&inner)));
        Self { inner, worker: Arc::new(Mutex::new(Some(worker))) }
    }

    /// Append an operation; the worker flushes immediately when idle.
    pub fn enqueue(&self, op: QueuedOp) {
        debug!(op = %op.describe(), "enqueued");
        self.inner.ops.lock().push_back(op);
        self.inner.wake.notify_one();
    }

    /// Current queue depth.
    pub fn pending(&self) -> usize {
        self.inner.ops.lock().len()
    }

    /// Server paths of all pending operations, queue order.
    pub fn pending_paths(&self) -> Vec<ServerPath> {
        self.inner.ops.lock().iter().map(|op| op.server_path().clone()).collect()
    }

    /// Cancel any pending flush timer. Does not abort an in-flight
    /// request; queued operations remain in memory until the queue is
    /// dropped.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    /// Stop the worker and wait for it to observe the cancellation
    /// (an in-flight request completes first).
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(inner: Arc<QueueInner>) {
    loop {
        // Park until there is work.
        while inner.ops.lock().is_empty() {
            tokio::select! {
                _ = inner.cancel.cancelled() => return,
                _ = inner.wake.notified() => {}
            }
        }
        if inner.cancel.is_cancelled() {
            return;
        }

        // Peek, do not pop: the op must survive a transport failure.
        let op = match inner.ops.lock().front().cloned() {
            Some(op) => op,
            None => continue,
        };

        match execute(&inner.remote, &op).await {
            Ok(()) => {
                inner.ops.lock().pop_front();
                *inner.backoff.lock() = inner.tuning.initial_backoff;
                debug!(op = %op.describe(), "synced");
                if inner.ops.lock().is_empty() {
                    (inner.on_status)("All synced");
                }
            }
            Err(e) if e.is_semantic() => {
                inner.ops.lock().pop_front();
                let status = e.status().unwrap_or_default();
                let line = format!("Dropping {}: {status} {e}", op.describe());
                warn!("{line}");
                (inner.on_status)(&line);
                if inner.ops.lock().is_empty() {
                    (inner.on_status)("All synced");
                }
            }
            Err(e) => {
                let delay = *inner.backoff.lock();
                let pending = inner.ops.lock().len();
                let line = format!(
                    "Sync error ({e}), {pending} op(s) pending. Retry in {}s",
                    delay.as_secs()
                );
                info!("{line}");
                (inner.on_status)(&line);
                *inner.backoff.lock() = (delay * 2).min(inner.tuning.max_backoff);
                tokio::select! {
                    _ = inner.cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn execute(remote: &Arc<dyn RemoteApi>, op: &QueuedOp) -> Result<(), ClientError> {
    match op {
        QueuedOp::Put { username, server_path, content, origin_ctime, origin_mtime, .. } => {
            let origin = Origin { ctime: origin_ctime.clone(), mtime: origin_mtime.clone() };
            remote.put_file(username, server_path.as_str(), content, &origin).await
        }
        QueuedOp::Delete { username, server_path, .. } => {
            remote.delete_file(username, server_path.as_str()).await
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
