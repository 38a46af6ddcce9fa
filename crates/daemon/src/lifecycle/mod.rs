// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

mod startup;
pub use startup::startup;

use std::path::{Path, PathBuf};

use thiserror::Error;

use sv_client::ClientError;
use sv_config::ConfigError;

use crate::watcher::WatcherError;

/// Per-user file locations the daemon reads and writes.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    /// Root config directory (e.g. ~/.config/seedvault)
    pub config_dir: PathBuf,
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Path to the health snapshot
    pub health_path: PathBuf,
    /// Path to the lock/PID file
    pub pid_path: PathBuf,
    /// Path to the Unix change-stream socket
    pub socket_path: PathBuf,
    /// Path to the daemon log file
    pub log_path: PathBuf,
}

impl DaemonPaths {
    /// Resolve paths for the user-level daemon. One daemon serves one
    /// user; everything lives in the shared config directory.
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::in_dir(&sv_config::config_dir()?))
    }

    /// Paths rooted at an explicit directory (tests, custom setups).
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config_dir: dir.to_path_buf(),
            config_path: dir.join("config.json"),
            health_path: dir.join("daemon-health.json"),
            pid_path: dir.join("daemon.pid"),
            socket_path: dir.join("daemon.sock"),
            log_path: dir.join("daemon.log"),
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire PID lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("another sync engine is already running (health file is fresh)")]
    AlreadyRunning,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("authentication failed ({0}); reconfigure your token")]
    Auth(String),

    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
