// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sv-client: typed HTTP facade over the remote seedvault API.

mod client;
mod error;
mod remote;
mod sse;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use client::{encode_path, ApiClient};
pub use error::ClientError;
pub use remote::RemoteApi;
pub use sse::{SseMessage, SseParser, Subscription};
pub use types::{Contributor, FileDeleted, FileUpdated, Invite, Me, Origin, RemoteEvent, RemoteFile};

#[cfg(any(test, feature = "test-support"))]
pub use test_support::{FakeRemote, RecordedOp};
