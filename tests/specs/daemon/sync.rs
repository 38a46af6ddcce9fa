// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync engine scenarios against the fake vault.

use std::sync::Arc;
use std::time::Duration;

use sv_config::Config;
use sv_core::Collection;
use sv_daemon::lifecycle::{startup, DaemonPaths, LifecycleError};
use sv_daemon::supervisor::{Supervisor, SupervisorConfig};
use sv_daemon::watcher::WatcherTuning;

use crate::prelude::*;

struct Daemon {
    supervisor: Arc<Supervisor>,
    _config_dir: tempfile::TempDir,
}

fn daemon_config(dir: &std::path::Path) -> SupervisorConfig {
    let mut cfg = SupervisorConfig::for_paths(DaemonPaths::in_dir(dir));
    cfg.health_interval = Duration::from_millis(200);
    cfg.reconcile_interval = Duration::from_secs(120);
    cfg.debounce = Duration::from_millis(50);
    cfg.drain_timeout = Duration::from_secs(2);
    cfg.watcher_tuning = WatcherTuning {
        debounce: Duration::from_millis(50),
        poll_interval: Duration::from_millis(100),
        force_poll: false,
    };
    cfg
}

/// Start a full daemon against the vault with the given collections.
async fn start_daemon(vault: &FakeVault, collections: Vec<Collection>) -> Daemon {
    let config_dir = tempfile::tempdir().expect("config dir");
    let cfg = daemon_config(config_dir.path());
    let config = Config {
        server: vault.url().to_string(),
        token: "spec-token".into(),
        username: "alice".into(),
        collections,
    };
    config.save(&cfg.paths.config_path).expect("save config");

    let supervisor = startup(cfg).await.expect("startup");
    supervisor.run().await;
    Daemon { supervisor, _config_dir: config_dir }
}

// ── S1: empty to one file ─────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_vault_receives_first_write() {
    let vault = FakeVault::spawn().await;
    let notes = tempfile::tempdir().unwrap();
    let daemon = start_daemon(&vault, vec![Collection::new("notes", notes.path())]).await;

    std::fs::write(notes.path().join("hello.md"), "# Hi\n").unwrap();

    let v = vault.clone();
    assert!(
        wait_for(SPEC_WAIT_MAX_MS, move || v.content("notes/hello.md").as_deref() == Some("# Hi\n"))
            .await,
        "hello.md should arrive; vault has {:?}",
        vault.paths()
    );

    let sup = Arc::clone(&daemon.supervisor);
    assert!(
        wait_for(SPEC_WAIT_MAX_MS, move || sup.status().pending_ops == 0).await,
        "queue should drain"
    );
    assert!(daemon.supervisor.status().server_reachable);

    daemon.supervisor.shutdown().await;
}

// ── S2: config add then remove ────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replacing_a_collection_purges_and_syncs() {
    let vault = FakeVault::spawn().await;
    let col_a = tempfile::tempdir().unwrap();
    let col_b = tempfile::tempdir().unwrap();
    std::fs::write(col_a.path().join("x.md"), "X").unwrap();
    std::fs::write(col_b.path().join("y.md"), "Y").unwrap();

    let daemon = start_daemon(&vault, vec![Collection::new("a", col_a.path())]).await;
    assert_eq!(vault.content("a/x.md").as_deref(), Some("X"), "initial sync uploaded a/x.md");

    let new_config = Config {
        server: vault.url().to_string(),
        token: "spec-token".into(),
        username: "alice".into(),
        collections: vec![Collection::new("b", col_b.path())],
    };
    new_config.save(daemon.supervisor.config_path()).unwrap();

    let v = vault.clone();
    assert!(
        wait_for(SPEC_WAIT_MAX_MS, move || v.content("b/y.md").as_deref() == Some("Y")).await,
        "b/y.md should be uploaded"
    );
    let v = vault.clone();
    assert!(
        wait_for(SPEC_WAIT_MAX_MS, move || v.content("a/x.md").is_none()).await,
        "a/x.md should be deleted"
    );

    // The watcher now follows /tmp/b only.
    std::fs::write(col_a.path().join("late.md"), "late").unwrap();
    std::fs::write(col_b.path().join("fresh.md"), "fresh").unwrap();
    let v = vault.clone();
    assert!(wait_for(SPEC_WAIT_MAX_MS, move || v.content("b/fresh.md").is_some()).await);
    assert!(vault.content("a/late.md").is_none(), "removed collection is not watched");

    daemon.supervisor.shutdown().await;
}

// ── S3: retry across a server outage ──────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_during_outage_is_retried_until_recovery() {
    let vault = FakeVault::spawn().await;
    let notes = tempfile::tempdir().unwrap();
    let daemon = start_daemon(&vault, vec![Collection::new("notes", notes.path())]).await;

    vault.set_failing(true);
    std::fs::write(notes.path().join("a.md"), "offline write").unwrap();

    let sup = Arc::clone(&daemon.supervisor);
    assert!(
        wait_for(SPEC_WAIT_MAX_MS, move || sup.status().pending_ops >= 1).await,
        "op should be parked in the queue during the outage"
    );
    assert!(vault.content("notes/a.md").is_none());

    vault.set_failing(false);
    let v = vault.clone();
    assert!(
        wait_for(SPEC_WAIT_MAX_MS, move || {
            v.content("notes/a.md").as_deref() == Some("offline write")
        })
        .await,
        "retry should land once the server recovers"
    );
    let sup = Arc::clone(&daemon.supervisor);
    assert!(wait_for(SPEC_WAIT_MAX_MS, move || sup.status().pending_ops == 0).await);

    daemon.supervisor.shutdown().await;
}

// ── S5: orphan purge after offline removal ────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_purges_prefixes_no_longer_configured() {
    let vault = FakeVault::spawn().await;
    vault.seed("legacy/old.md", "bye", None);
    vault.seed("legacy/sub/older.md", "bye", None);

    let notes = tempfile::tempdir().unwrap();
    let daemon = start_daemon(&vault, vec![Collection::new("notes", notes.path())]).await;

    // Initial sync ran inside start_daemon; legacy/* must be gone.
    assert!(vault.content("legacy/old.md").is_none());
    assert!(vault.content("legacy/sub/older.md").is_none());
    // Two deletes were issued (one per orphan).
    let delete_count = vault
        .requests()
        .iter()
        .filter(|r| matches!(r, VaultRequest::Delete { .. }))
        .count();
    assert_eq!(delete_count, 2);

    daemon.supervisor.shutdown().await;
}

// ── skip logic: server-newer files are not re-uploaded ────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_newer_files_are_skipped() {
    let vault = FakeVault::spawn().await;
    let notes = tempfile::tempdir().unwrap();
    std::fs::write(notes.path().join("stable.md"), "local copy").unwrap();
    // Server already has the file with an origin mtime far in the future.
    vault.seed("notes/stable.md", "server copy", Some("2999-01-01T00:00:00Z"));

    let daemon = start_daemon(&vault, vec![Collection::new("notes", notes.path())]).await;

    assert_eq!(
        vault.content("notes/stable.md").as_deref(),
        Some("server copy"),
        "server-newer file must not be overwritten"
    );

    daemon.supervisor.shutdown().await;
}

// ── auth failures at startup are fatal ────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_token_fails_startup() {
    let vault = FakeVault::spawn().await;
    vault.set_auth_fail(true);

    let config_dir = tempfile::tempdir().unwrap();
    let cfg = daemon_config(config_dir.path());
    let config = Config {
        server: vault.url().to_string(),
        token: "expired".into(),
        username: "alice".into(),
        collections: vec![],
    };
    config.save(&cfg.paths.config_path).unwrap();

    let err = startup(cfg).await.expect_err("startup must fail on 401");
    assert!(matches!(err, LifecycleError::Auth(_)), "got {err:?}");
}
