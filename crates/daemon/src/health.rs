// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health snapshot file.
//!
//! Written periodically under atomic-write semantics and read by the
//! operator-facing CLI. Readers treat absence or a stale `updated_at`
//! as "daemon missing or stalled".

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sv_core::SyncStatus;

/// The on-disk health document: engine status plus identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    #[serde(flatten)]
    pub status: SyncStatus,
    pub server_url: String,
    pub username: String,
    pub pid: u32,
    pub uptime_secs: u64,
    pub updated_at: DateTime<Utc>,
}

impl HealthSnapshot {
    /// True when this snapshot says a live engine wrote it recently.
    /// "Recently" is three health intervals: one missed write is jitter,
    /// three is a dead process.
    pub fn indicates_running(&self, health_interval: Duration, now: DateTime<Utc>) -> bool {
        if !self.status.running {
            return false;
        }
        let age = now.signed_duration_since(self.updated_at);
        age.num_milliseconds() >= 0
            && age.num_milliseconds() as u128 <= 3 * health_interval.as_millis()
    }
}

/// Write the snapshot pretty-printed via temp file + rename.
pub fn write_health(path: &Path, snapshot: &HealthSnapshot) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a snapshot; `None` when absent or unparseable.
pub fn read_health(path: &Path) -> Option<HealthSnapshot> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
