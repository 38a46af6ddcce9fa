// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the remote API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated user, as reported by `/v1/me`.
///
/// Older servers call the namespace `contributor`; `username` is canonical
/// here and the alias covers both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Me {
    #[serde(alias = "contributor", alias = "name")]
    pub username: String,
}

/// One contributor namespace on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    #[serde(alias = "contributor", alias = "name")]
    pub username: String,
}

/// An invite code minted by `/v1/invites`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub code: String,
}

/// One entry from a file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_mtime: Option<DateTime<Utc>>,
}

impl RemoteFile {
    /// The timestamp reconciliation compares local mtimes against:
    /// the uploader-supplied origin mtime when present, else the
    /// server-side modification time.
    pub fn effective_mtime_ms(&self) -> u64 {
        self.origin_mtime.unwrap_or(self.modified_at).timestamp_millis().max(0) as u64
    }
}

/// Optional origin timestamps attached to an upload as
/// `X-Origin-Ctime` / `X-Origin-Mtime` headers (ISO-8601).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub ctime: Option<String>,
    pub mtime: Option<String>,
}

/// Remote change events consumed from the server-sent-event stream.
/// `connected`, `activity`, and keepalives never surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    FileUpdated(FileUpdated),
    FileDeleted(FileDeleted),
}

/// Payload of a `file_updated` server event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdated {
    pub id: u64,
    pub contributor: String,
    pub path: String,
    pub size: u64,
    #[serde(rename = "modifiedAt")]
    pub modified_at: DateTime<Utc>,
}

/// Payload of a `file_deleted` server event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDeleted {
    pub id: u64,
    pub contributor: String,
    pub path: String,
}
