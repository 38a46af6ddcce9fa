// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon status as written to the health file and served over the
//! local API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live status of the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Whether the engine is running (false in the final shutdown snapshot).
    pub running: bool,
    /// Result of the most recent remote health probe.
    pub server_reachable: bool,
    /// Number of collections currently watched.
    pub collections_watched: usize,
    /// Depth of the retry queue.
    pub pending_ops: usize,
    /// Whether the filesystem watcher backend is alive.
    pub watcher_alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_at: Option<DateTime<Utc>>,
}
