// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::Utc;
use fs2::FileExt;

use sv_config::{Config, ConfigError};
use sv_core::SyncStatus;

use crate::health::{write_health, HealthSnapshot};
use crate::lifecycle::{DaemonPaths, LifecycleError};
use crate::supervisor::SupervisorConfig;

use super::*;

fn cfg_in(dir: &std::path::Path) -> SupervisorConfig {
    let mut cfg = SupervisorConfig::for_paths(DaemonPaths::in_dir(dir));
    cfg.health_interval = Duration::from_secs(5);
    cfg
}

#[tokio::test]
async fn missing_config_is_fatal_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());
    let err = startup(cfg.clone()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Config(ConfigError::Missing(_))));
    assert!(!cfg.paths.pid_path.exists(), "failed startup leaves no PID file");
}

#[tokio::test]
async fn fresh_health_file_means_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());
    let snapshot = HealthSnapshot {
        status: SyncStatus { running: true, ..SyncStatus::default() },
        server_url: "http://127.0.0.1:1/".into(),
        username: "alice".into(),
        pid: 1,
        uptime_secs: 1,
        updated_at: Utc::now(),
    };
    write_health(&cfg.paths.health_path, &snapshot).unwrap();

    let err = startup(cfg).await.unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyRunning));
}

#[tokio::test]
async fn stale_health_file_does_not_block_startup() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());
    let snapshot = HealthSnapshot {
        status: SyncStatus { running: true, ..SyncStatus::default() },
        server_url: "http://127.0.0.1:1/".into(),
        username: "alice".into(),
        pid: 1,
        uptime_secs: 1,
        updated_at: Utc::now() - chrono::Duration::minutes(10),
    };
    write_health(&cfg.paths.health_path, &snapshot).unwrap();

    // Gets past the coexistence check and fails later on the missing
    // config instead.
    let err = startup(cfg).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Config(ConfigError::Missing(_))));
}

#[tokio::test]
async fn held_pid_lock_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());
    std::fs::create_dir_all(&cfg.paths.config_dir).unwrap();
    let holder = std::fs::File::create(&cfg.paths.pid_path).unwrap();
    holder.try_lock_exclusive().unwrap();

    let err = startup(cfg.clone()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::LockFailed(_)));
    // The other daemon's PID file is untouched.
    assert!(cfg.paths.pid_path.exists());
}

#[tokio::test]
async fn unreachable_server_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = cfg_in(dir.path());
    let config = Config {
        // Port 1 refuses connections.
        server: "http://127.0.0.1:1/".into(),
        token: "secret".into(),
        username: "alice".into(),
        collections: vec![],
    };
    config.save(&cfg.paths.config_path).unwrap();

    let err = startup(cfg).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Unreachable(_)));
}
