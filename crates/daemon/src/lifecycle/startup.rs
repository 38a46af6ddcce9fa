// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use fs2::FileExt;
use tracing::{info, warn};

use sv_client::{ApiClient, RemoteApi};
use sv_config::Config;

use crate::health::read_health;
use crate::stream::ChangeStream;
use crate::supervisor::{Supervisor, SupervisorConfig};

use super::LifecycleError;

/// Start the sync engine: validate the environment, the configuration,
/// and the server, then assemble the supervisor. The caller runs it and
/// drives shutdown.
pub async fn startup(cfg: SupervisorConfig) -> Result<Arc<Supervisor>, LifecycleError> {
    match startup_inner(cfg.clone()).await {
        Ok(supervisor) => Ok(supervisor),
        Err(e) => {
            // Don't clean up if another daemon owns these files.
            if !matches!(e, LifecycleError::LockFailed(_) | LifecycleError::AlreadyRunning) {
                cleanup_on_failure(&cfg);
            }
            Err(e)
        }
    }
}

async fn startup_inner(cfg: SupervisorConfig) -> Result<Arc<Supervisor>, LifecycleError> {
    let paths = &cfg.paths;

    // 1. Create the config directory (needed for socket, lock, health)
    std::fs::create_dir_all(&paths.config_dir)?;

    // 2. Coexistence check: a fresh health file means another engine
    // (possibly a different implementation sharing the config dir) is
    // live. The PID lock below only guards against *this* binary.
    if let Some(snapshot) = read_health(&paths.health_path) {
        if snapshot.indicates_running(cfg.health_interval, Utc::now()) {
            return Err(LifecycleError::AlreadyRunning);
        }
    }

    // 3. Acquire the PID lock. Open without truncating so a failed lock
    // doesn't wipe the running daemon's PID; stale files (dead PID) are
    // simply re-locked and overwritten.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&paths.pid_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file; // Drop mutability

    // 4. Load and normalize the configuration
    let loaded = Config::load(&paths.config_path)?;
    let (config, removed) = loaded.normalize();
    for c in &removed {
        warn!(name = %c.name, path = %c.path.display(), "pruned overlapping collection at startup");
    }
    info!(
        collections = config.collections.len(),
        server = %config.server,
        username = %config.username,
        "configuration loaded"
    );

    // 5. Build the client and verify the server
    let client = ApiClient::new(&config.server, &config.token)?;
    let remote: Arc<dyn RemoteApi> = Arc::new(client.clone());
    if !remote.health().await {
        return Err(LifecycleError::Unreachable(config.server.clone()));
    }
    match remote.me().await {
        Ok(me) => {
            if me.username != config.username {
                warn!(
                    configured = %config.username,
                    server_reports = %me.username,
                    "username mismatch; using configured value"
                );
            }
        }
        Err(e) if e.is_auth() => return Err(LifecycleError::Auth(e.to_string())),
        Err(e) => warn!(error = %e, "identity check failed; continuing"),
    }

    // 6. Bind the change-stream socket (stale socket files are removed)
    let stream = Arc::new(ChangeStream::bind(&paths.socket_path)?);

    // 7. Assemble the supervisor; `run` starts the watcher and loops
    let supervisor = Supervisor::new(cfg, config, client, remote, stream, lock_file);

    info!("daemon started");
    Ok(supervisor)
}

/// Clean up resources on startup failure
fn cleanup_on_failure(cfg: &SupervisorConfig) {
    if cfg.paths.socket_path.exists() {
        let _ = std::fs::remove_file(&cfg.paths.socket_path);
    }
    if cfg.paths.pid_path.exists() {
        let _ = std::fs::remove_file(&cfg.paths.pid_path);
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
