// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-collection reconciliation and watcher-event handling.
//!
//! Reconciliation compares a server listing against a directory walk and
//! produces the minimal set of uploads and deletes, run with bounded
//! concurrency. Inline failures are never fatal: the operation moves to
//! the retry queue and drains when connectivity returns. Watcher events
//! always go through the queue, so per-path ordering is the queue's FIFO
//! order.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use sv_client::{ClientError, Origin, RemoteApi};
use sv_core::{
    epoch_ms, iso_ms, resolve_origin_ctime, Collection, FileEvent, FileEventKind, FileSnapshot,
    ServerPath,
};

use crate::queue::{QueuedOp, RetryQueue};
use crate::watcher::ignored_segment;

/// Upload/delete pool size during reconciliation.
const RECONCILE_CONCURRENCY: usize = 10;

/// Tally of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub uploaded: usize,
    pub skipped: usize,
    pub deleted: usize,
    /// Operations that failed inline and moved to the retry queue.
    pub enqueued: usize,
}

impl SyncOutcome {
    fn absorb(&mut self, other: SyncOutcome) {
        self.uploaded += other.uploaded;
        self.skipped += other.skipped;
        self.deleted += other.deleted;
        self.enqueued += other.enqueued;
    }
}

/// Owns the per-collection sync operations and the retry queue.
pub struct Syncer {
    username: String,
    collections: Vec<Collection>,
    remote: Arc<dyn RemoteApi>,
    queue: RetryQueue,
}

impl Syncer {
    pub fn new(
        username: impl Into<String>,
        collections: Vec<Collection>,
        remote: Arc<dyn RemoteApi>,
        queue: RetryQueue,
    ) -> Self {
        Self { username: username.into(), collections, remote, queue }
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    /// Reconcile every active collection, then purge orphans.
    ///
    /// Collection-level errors are logged and skipped: the daemon keeps
    /// watching and the queue retries what it can.
    pub async fn initial_sync(&self) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        for c in &self.collections {
            match self.sync_collection(c).await {
                Ok(o) => outcome.absorb(o),
                Err(e) => warn!(collection = %c.name, error = %e, "collection sync failed"),
            }
        }
        match self.purge_orphans().await {
            Ok(o) => outcome.absorb(o),
            Err(e) => warn!(error = %e, "orphan purge failed"),
        }
        info!(
            uploaded = outcome.uploaded,
            skipped = outcome.skipped,
            deleted = outcome.deleted,
            enqueued = outcome.enqueued,
            "sync pass complete"
        );
        outcome
    }

    /// Reconcile one collection: list the server prefix, walk the local
    /// tree, upload stale/missing files and delete remote-only ones.
    pub async fn sync_collection(&self, c: &Collection) -> Result<SyncOutcome, ClientError> {
        let listing = self.remote.list_files(&format!("{}/", c.name)).await?;
        let remote_mtimes: HashMap<String, u64> =
            listing.iter().map(|f| (f.path.clone(), f.effective_mtime_ms())).collect();

        let locals = walk_collection(c);
        let local_paths: HashSet<String> =
            locals.iter().map(|s| s.server_path.as_str().to_string()).collect();

        let mut outcome = SyncOutcome::default();
        let mut to_upload = Vec::new();
        for snap in locals {
            match remote_mtimes.get(snap.server_path.as_str()) {
                Some(remote_ms) if *remote_ms >= snap.mtime_ms => outcome.skipped += 1,
                _ => to_upload.push(snap),
            }
        }

        outcome.absorb(self.upload_many(to_upload).await);

        let remote_only: Vec<String> =
            listing.into_iter().map(|f| f.path).filter(|p| !local_paths.contains(p)).collect();
        outcome.absorb(self.delete_many(remote_only).await);

        Ok(outcome)
    }

    /// Delete every server file whose first path segment is not an
    /// active collection name. Covers collections removed while the
    /// daemon was offline.
    pub async fn purge_orphans(&self) -> Result<SyncOutcome, ClientError> {
        let files = self.remote.list_files("").await?;
        let active: HashSet<&str> = self.collections.iter().map(|c| c.name.as_str()).collect();
        let orphans: Vec<String> = files
            .into_iter()
            .map(|f| f.path)
            .filter(|p| {
                let head = p.split('/').next().unwrap_or_default();
                !active.contains(head)
            })
            .collect();
        if !orphans.is_empty() {
            info!(count = orphans.len(), "purging orphaned server files");
        }
        Ok(self.delete_many(orphans).await)
    }

    /// Delete everything under `<name>/` on the server.
    pub async fn purge_collection(&self, name: &str) -> Result<SyncOutcome, ClientError> {
        let files = self.remote.list_files(&format!("{name}/")).await?;
        let paths: Vec<String> = files.into_iter().map(|f| f.path).collect();
        info!(collection = name, count = paths.len(), "purging removed collection");
        Ok(self.delete_many(paths).await)
    }

    /// Handle one watcher event. Never executes synchronously: the
    /// operation goes through the queue.
    pub async fn handle_event(&self, event: &FileEvent) {
        let now_ms = epoch_ms();
        match event.kind {
            FileEventKind::Added | FileEventKind::Changed => {
                let content = match tokio::fs::read(&event.local_path).await {
                    Ok(content) => content,
                    Err(e) => {
                        // Deleted between event and read; the Removed
                        // event follows.
                        debug!(path = %event.server_path, error = %e, "skipping unreadable file");
                        return;
                    }
                };
                let meta = tokio::fs::metadata(&event.local_path).await.ok();
                let mtime_ms = meta
                    .as_ref()
                    .and_then(|m| m.modified().ok())
                    .map(sv_core::system_time_ms)
                    .filter(|ms| *ms > 0)
                    .unwrap_or(now_ms);
                let birthtime_ms =
                    meta.as_ref().and_then(|m| m.created().ok()).map(sv_core::system_time_ms);
                let ctime_ms = resolve_origin_ctime(birthtime_ms, Some(mtime_ms), now_ms);
                self.queue.enqueue(QueuedOp::Put {
                    username: self.username.clone(),
                    server_path: event.server_path.clone(),
                    content,
                    origin_ctime: Some(iso_ms(ctime_ms)),
                    origin_mtime: Some(iso_ms(mtime_ms)),
                    enqueued_at_ms: now_ms,
                });
            }
            FileEventKind::Removed => {
                self.queue.enqueue(QueuedOp::Delete {
                    username: self.username.clone(),
                    server_path: event.server_path.clone(),
                    enqueued_at_ms: now_ms,
                });
            }
        }
    }

    /// Upload snapshots with bounded concurrency; inline failures are
    /// enqueued for retry.
    async fn upload_many(&self, snapshots: Vec<FileSnapshot>) -> SyncOutcome {
        let semaphore = Arc::new(Semaphore::new(RECONCILE_CONCURRENCY));
        let mut set: JoinSet<SyncOutcome> = JoinSet::new();
        for snap in snapshots {
            let semaphore = Arc::clone(&semaphore);
            let remote = Arc::clone(&self.remote);
            let queue = self.queue.clone();
            let username = self.username.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                upload_one(&remote, &queue, &username, snap).await
            });
        }
        join_outcomes(set).await
    }

    /// Delete server paths with bounded concurrency; inline failures are
    /// enqueued for retry. Paths that do not parse as server paths are
    /// logged and dropped (they cannot be retried).
    async fn delete_many(&self, paths: Vec<String>) -> SyncOutcome {
        let semaphore = Arc::new(Semaphore::new(RECONCILE_CONCURRENCY));
        let mut set: JoinSet<SyncOutcome> = JoinSet::new();
        for path in paths {
            let semaphore = Arc::clone(&semaphore);
            let remote = Arc::clone(&self.remote);
            let queue = self.queue.clone();
            let username = self.username.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let mut outcome = SyncOutcome::default();
                match remote.delete_file(&username, &path).await {
                    Ok(()) => outcome.deleted += 1,
                    Err(e) => match ServerPath::parse(path.clone()) {
                        Ok(server_path) => {
                            debug!(path = %server_path, error = %e, "delete failed, enqueueing");
                            queue.enqueue(QueuedOp::Delete {
                                username,
                                server_path,
                                enqueued_at_ms: epoch_ms(),
                            });
                            outcome.enqueued += 1;
                        }
                        Err(parse) => {
                            warn!(path = %path, error = %e, parse = %parse, "dropping undeletable path");
                        }
                    },
                }
                outcome
            });
        }
        join_outcomes(set).await
    }
}

async fn upload_one(
    remote: &Arc<dyn RemoteApi>,
    queue: &RetryQueue,
    username: &str,
    snap: FileSnapshot,
) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    let content = match tokio::fs::read(&snap.local_path).await {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %snap.server_path, error = %e, "file vanished during sync");
            return outcome;
        }
    };
    let now_ms = epoch_ms();
    let ctime_ms = resolve_origin_ctime(Some(snap.birthtime_ms), Some(snap.mtime_ms), now_ms);
    let origin_ctime = Some(iso_ms(ctime_ms));
    let origin_mtime = Some(iso_ms(snap.mtime_ms));
    let origin = Origin { ctime: origin_ctime.clone(), mtime: origin_mtime.clone() };
    match remote.put_file(username, snap.server_path.as_str(), &content, &origin).await {
        Ok(()) => outcome.uploaded += 1,
        Err(e) => {
            debug!(path = %snap.server_path, error = %e, "upload failed, enqueueing");
            queue.enqueue(QueuedOp::Put {
                username: username.to_string(),
                server_path: snap.server_path,
                content,
                origin_ctime,
                origin_mtime,
                enqueued_at_ms: now_ms,
            });
            outcome.enqueued += 1;
        }
    }
    outcome
}

async fn join_outcomes(mut set: JoinSet<SyncOutcome>) -> SyncOutcome {
    let mut total = SyncOutcome::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => total.absorb(outcome),
            Err(e) => warn!(error = %e, "sync task failed"),
        }
    }
    total
}

/// Walk a collection root collecting markdown files, skipping ignored
/// segments (dotfiles, `node_modules`, temp names).
fn walk_collection(c: &Collection) -> Vec<FileSnapshot> {
    let mut out = Vec::new();
    let mut stack = vec![c.path.clone()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "walk skipping unreadable dir");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path: PathBuf = entry.path();
            let name = entry.file_name();
            if ignored_segment(&name.to_string_lossy()) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if meta.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "md") {
                if let Some(server_path) = ServerPath::from_local(c, &path) {
                    out.push(FileSnapshot::from_metadata(path, server_path, &meta));
                }
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "syncer_tests.rs"]
mod tests;
