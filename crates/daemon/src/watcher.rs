// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem watcher over the active collections.
//!
//! Raw notify events are mapped to normalized server-path events. Ignore
//! rules apply to path segments *relative* to the collection root, so a
//! collection that itself lives under a dot-directory is still watched.
//! Write bursts to one path are debounced: `Changed` is emitted only
//! after 300ms of quiescence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config as NotifyConfig, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sv_core::{Collection, FileEvent, FileEventKind, ServerPath};

use crate::env;

/// Watcher backend lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    Ready,
    /// The backend failed irrecoverably; the supervisor rebuilds.
    Closed,
}

/// Watcher errors
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("watcher backend error: {0}")]
    Backend(String),

    #[error("failed to watch {0}: {1}")]
    Watch(PathBuf, String),
}

/// Watcher timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct WatcherTuning {
    /// Quiescence window before a burst of writes emits `Changed`.
    pub debounce: Duration,
    /// Poll interval for the fallback backend.
    pub poll_interval: Duration,
    /// Use the polling backend even when native notifications work.
    pub force_poll: bool,
}

impl Default for WatcherTuning {
    fn default() -> Self {
        Self {
            debounce: env::debounce(),
            poll_interval: Duration::from_millis(500),
            force_poll: env::force_poll(),
        }
    }
}

/// Recursive watcher over every active collection root.
pub struct CollectionWatcher {
    state: Arc<Mutex<WatcherState>>,
    cancel: CancellationToken,
    // NOTE(lifetime): held so the backend keeps delivering; dropped on close
    backend: Option<Box<dyn Watcher + Send>>,
}

impl CollectionWatcher {
    /// Build the backend, watch every collection root, and spawn the
    /// mapping/debounce task. Events and errors surface via callbacks.
    pub fn spawn(
        collections: Vec<Collection>,
        tuning: WatcherTuning,
        on_event: impl Fn(FileEvent) + Send + Sync + 'static,
        on_error: impl Fn(WatcherError) + Send + Sync + 'static,
    ) -> Result<Self, WatcherError> {
        let state = Arc::new(Mutex::new(WatcherState::Starting));
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let handler = move |res: Result<notify::Event, notify::Error>| {
            // Dropped receiver just means the watcher is closing.
            let _ = tx.send(res);
        };

        let mut backend: Box<dyn Watcher + Send> = if tuning.force_poll {
            let config = NotifyConfig::default().with_poll_interval(tuning.poll_interval);
            Box::new(
                PollWatcher::new(handler, config)
                    .map_err(|e| WatcherError::Backend(e.to_string()))?,
            )
        } else {
            Box::new(
                RecommendedWatcher::new(handler, NotifyConfig::default())
                    .map_err(|e| WatcherError::Backend(e.to_string()))?,
            )
        };

        for c in &collections {
            backend
                .watch(&c.path, RecursiveMode::Recursive)
                .map_err(|e| WatcherError::Watch(c.path.clone(), e.to_string()))?;
        }

        *state.lock() = WatcherState::Ready;
        tokio::spawn(pump(
            collections,
            tuning.debounce,
            rx,
            Arc::clone(&state),
            cancel.clone(),
            on_event,
            on_error,
        ));

        Ok(Self { state, cancel, backend: Some(backend) })
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock()
    }

    /// False once the backend has failed or the watcher was closed.
    pub fn alive(&self) -> bool {
        self.state() != WatcherState::Closed
    }

    /// Stop watching and release the backend.
    pub fn close(&mut self) {
        self.cancel.cancel();
        *self.state.lock() = WatcherState::Closed;
        self.backend.take();
    }
}

impl Drop for CollectionWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map raw events, apply ignore rules, and debounce write bursts.
async fn pump(
    collections: Vec<Collection>,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<Result<notify::Event, notify::Error>>,
    state: Arc<Mutex<WatcherState>>,
    cancel: CancellationToken,
    on_event: impl Fn(FileEvent) + Send + Sync + 'static,
    on_error: impl Fn(WatcherError) + Send + Sync + 'static,
) {
    let mut pending: HashMap<PathBuf, (Instant, ServerPath)> = HashMap::new();
    loop {
        let next_deadline = pending.values().map(|(at, _)| *at).min();
        tokio::select! {
            _ = cancel.cancelled() => return,
            raw = rx.recv() => match raw {
                None => return,
                Some(Ok(event)) => {
                    for path in &event.paths {
                        classify(&collections, &event.kind, path, debounce, &mut pending, &on_event);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "watcher backend failed");
                    *state.lock() = WatcherState::Closed;
                    on_error(WatcherError::Backend(e.to_string()));
                    return;
                }
            },
            _ = sleep_until_opt(next_deadline) => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, (at, _))| *at <= now)
                    .map(|(p, _)| p.clone())
                    .collect();
                for path in due {
                    if let Some((_, server_path)) = pending.remove(&path) {
                        // The burst may have ended in a delete.
                        if path.is_file() {
                            on_event(FileEvent::new(FileEventKind::Changed, path, server_path));
                        }
                    }
                }
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn classify(
    collections: &[Collection],
    kind: &notify::EventKind,
    path: &Path,
    debounce: Duration,
    pending: &mut HashMap<PathBuf, (Instant, ServerPath)>,
    on_event: &(impl Fn(FileEvent) + Send + Sync + 'static),
) {
    use notify::event::{EventKind, ModifyKind};

    let server_path = match map_path(collections, path) {
        Some(sp) => sp,
        None => return,
    };

    match kind {
        EventKind::Remove(_) => {
            pending.remove(path);
            on_event(FileEvent::new(FileEventKind::Removed, path, server_path));
        }
        EventKind::Create(_) => {
            if path.is_file() {
                on_event(FileEvent::new(FileEventKind::Added, path, server_path));
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Renames surface as the old path vanishing or the new one
            // appearing.
            if path.exists() {
                on_event(FileEvent::new(FileEventKind::Added, path, server_path));
            } else {
                pending.remove(path);
                on_event(FileEvent::new(FileEventKind::Removed, path, server_path));
            }
        }
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
            if path.exists() {
                debug!(path = %server_path, "write burst, debouncing");
                pending.insert(path.to_path_buf(), (Instant::now() + debounce, server_path));
            } else {
                pending.remove(path);
                on_event(FileEvent::new(FileEventKind::Removed, path, server_path));
            }
        }
        EventKind::Access(_) => {}
    }
}

/// Map an absolute local path to its server path, or `None` when the
/// path is outside every collection, ignored, or not a markdown file.
pub fn map_path(collections: &[Collection], path: &Path) -> Option<ServerPath> {
    let collection = collections.iter().find(|c| c.contains(path))?;
    let rel = path.strip_prefix(&collection.path).ok()?;
    if is_ignored_rel(rel) {
        return None;
    }
    ServerPath::from_local(collection, path)
}

/// Segment-based ignore rules, applied below the collection root only:
/// dotfiles, `node_modules`, and editor temp names containing `.tmp.`.
pub fn is_ignored_rel(rel: &Path) -> bool {
    rel.components().any(|comp| ignored_segment(&comp.as_os_str().to_string_lossy()))
}

/// One path segment the sync engine never looks inside or uploads.
pub fn ignored_segment(seg: &str) -> bool {
    seg.starts_with('.') || seg == "node_modules" || seg.contains(".tmp.")
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
