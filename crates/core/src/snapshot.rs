// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Point-in-time view of a local file, produced while walking a
//! collection during reconciliation.

use std::fs::Metadata;
use std::path::PathBuf;

use crate::origin::system_time_ms;
use crate::server_path::ServerPath;

/// One local file as seen by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub local_path: PathBuf,
    pub server_path: ServerPath,
    pub mtime_ms: u64,
    pub birthtime_ms: u64,
    pub size: u64,
}

impl FileSnapshot {
    /// Build a snapshot from filesystem metadata. Platforms without birth
    /// time support report it as 0; origin resolution handles the fallback.
    pub fn from_metadata(local_path: PathBuf, server_path: ServerPath, meta: &Metadata) -> Self {
        let mtime_ms = meta.modified().map(system_time_ms).unwrap_or_default();
        let birthtime_ms = meta.created().map(system_time_ms).unwrap_or_default();
        Self { local_path, server_path, mtime_ms, birthtime_ms, size: meta.len() }
    }
}
