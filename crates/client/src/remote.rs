// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The remote operations the sync engine depends on.
//!
//! `ApiClient` is the production implementation; tests substitute
//! `FakeRemote` (feature `test-support`).

use async_trait::async_trait;

use crate::error::ClientError;
use crate::types::{Me, Origin, RemoteFile};

/// Remote file store operations used by the syncer and retry queue.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Probe reachability. Never errors: unreachable is `false`.
    async fn health(&self) -> bool;

    /// The authenticated user; 401/403 here means the token is bad.
    async fn me(&self) -> Result<Me, ClientError>;

    /// List files whose server path starts with `prefix`.
    async fn list_files(&self, prefix: &str) -> Result<Vec<RemoteFile>, ClientError>;

    /// Upload one markdown file.
    async fn put_file(
        &self,
        username: &str,
        path: &str,
        content: &[u8],
        origin: &Origin,
    ) -> Result<(), ClientError>;

    /// Delete one file.
    async fn delete_file(&self, username: &str, path: &str) -> Result<(), ClientError>;
}
