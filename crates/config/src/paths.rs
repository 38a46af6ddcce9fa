// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user file locations.
//!
//! Resolution order: `SEEDVAULT_CONFIG_DIR` > `$XDG_CONFIG_HOME/seedvault`
//! > `~/.config/seedvault`.

use std::path::PathBuf;

use crate::model::ConfigError;

/// Resolve the per-user configuration directory.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("SEEDVAULT_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("seedvault"));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
    Ok(home.join(".config").join("seedvault"))
}

/// Path to the configuration file.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json"))
}

/// Path to the daemon health snapshot.
pub fn health_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("daemon-health.json"))
}

/// Path to the daemon PID file.
pub fn pid_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("daemon.pid"))
}

/// Path to the Unix-domain change-stream socket.
pub fn socket_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("daemon.sock"))
}

/// Path to the daemon log file.
pub fn log_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("daemon.log"))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
