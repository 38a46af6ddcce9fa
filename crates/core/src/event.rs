// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File events produced by the watcher and fanned out to local consumers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::server_path::ServerPath;

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    Added,
    Changed,
    Removed,
}

/// A normalized watcher event for a markdown file inside an active
/// collection. Events for paths outside every collection never reach
/// consumers; the watcher drops them before constructing this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub local_path: PathBuf,
    pub server_path: ServerPath,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, local_path: impl Into<PathBuf>, server_path: ServerPath) -> Self {
        Self { kind, local_path: local_path.into(), server_path }
    }
}
