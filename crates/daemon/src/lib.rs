// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seedvault sync daemon library
//!
//! This module exposes the sync engine for use by the integration specs
//! and local controllers.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod api;
pub mod env;
pub mod event_bus;
pub mod health;
pub mod lifecycle;
pub mod queue;
pub mod stream;
pub mod supervisor;
pub mod syncer;
pub mod watcher;

pub use event_bus::{EventBus, Subscription};
pub use health::HealthSnapshot;
pub use lifecycle::{DaemonPaths, LifecycleError};
pub use queue::{QueueTuning, QueuedOp, RetryQueue};
pub use stream::{ChangeStream, StreamAction, StreamEvent};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use syncer::{SyncOutcome, Syncer};
pub use watcher::{CollectionWatcher, WatcherError, WatcherState, WatcherTuning};
