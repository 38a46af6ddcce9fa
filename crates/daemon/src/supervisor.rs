// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Long-lived composition of the sync engine.
//!
//! The supervisor owns the active configuration, the HTTP client, the
//! syncer (and through it the retry queue), and the filesystem watcher.
//! Three scheduled loops run beside the event pump: config reload,
//! health, and periodic reconciliation. Reloads and sync passes share a
//! busy guard; the periodic loops skip a tick rather than queue behind
//! it.

use std::collections::HashMap;
use std::fs::File;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::{Config as NotifyConfig, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sv_client::{ApiClient, RemoteApi};
use sv_config::Config;
use sv_core::{Collection, FileEvent, SyncStatus};

use crate::env;
use crate::event_bus::{EventBus, Subscription};
use crate::health::{write_health, HealthSnapshot};
use crate::lifecycle::{DaemonPaths, LifecycleError};
use crate::queue::{QueueTuning, RetryQueue};
use crate::stream::{ChangeStream, StreamEvent};
use crate::syncer::Syncer;
use crate::watcher::{CollectionWatcher, WatcherError, WatcherTuning};

/// Supervisor timing and feature knobs, resolved from the environment
/// once at startup.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub paths: DaemonPaths,
    pub health_interval: Duration,
    pub reconcile_interval: Duration,
    pub debounce: Duration,
    pub drain_timeout: Duration,
    pub watcher_tuning: WatcherTuning,
    pub queue_tuning: QueueTuning,
    /// When false, `PUT /config/collections` answers 501 instead of
    /// writing the config file.
    pub mutable_config: bool,
}

impl SupervisorConfig {
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::for_paths(DaemonPaths::load()?))
    }

    pub fn for_paths(paths: DaemonPaths) -> Self {
        Self {
            paths,
            health_interval: env::health_interval(),
            reconcile_interval: env::reconcile_interval(),
            debounce: env::debounce(),
            drain_timeout: env::drain_timeout(),
            watcher_tuning: WatcherTuning::default(),
            queue_tuning: QueueTuning::default(),
            mutable_config: true,
        }
    }
}

/// The long-lived sync engine.
pub struct Supervisor {
    cfg: SupervisorConfig,
    config: Mutex<Config>,
    client: Mutex<ApiClient>,
    remote: Mutex<Arc<dyn RemoteApi>>,
    syncer: Mutex<Arc<Syncer>>,
    watcher: Mutex<Option<CollectionWatcher>>,
    bus: EventBus,
    stream: Arc<ChangeStream>,
    event_tx: mpsc::UnboundedSender<FileEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<FileEvent>>>,
    /// Serializes reloads and sync passes; periodic loops skip when held.
    busy: tokio::sync::Mutex<()>,
    server_reachable: AtomicBool,
    watcher_failures: AtomicU32,
    last_queue_status: Arc<Mutex<Option<String>>>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    last_reconcile: Mutex<Option<DateTime<Utc>>>,
    start_time: Instant,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
    subscriptions: Mutex<Vec<Subscription>>,
    // NOTE(lifetime): Held to maintain exclusive PID lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor").finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Assemble the engine around an already-validated configuration.
    /// `startup` is the only production caller.
    pub fn new(
        cfg: SupervisorConfig,
        config: Config,
        client: ApiClient,
        remote: Arc<dyn RemoteApi>,
        stream: Arc<ChangeStream>,
        lock_file: File,
    ) -> Arc<Self> {
        let last_queue_status: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let queue = RetryQueue::with_tuning(
            Arc::clone(&remote),
            queue_status_fn(Arc::clone(&last_queue_status)),
            cfg.queue_tuning,
        );
        let syncer = Arc::new(Syncer::new(
            config.username.clone(),
            config.collections.clone(),
            Arc::clone(&remote),
            queue,
        ));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Arc::new(Self {
            cfg,
            config: Mutex::new(config),
            client: Mutex::new(client),
            remote: Mutex::new(remote),
            syncer: Mutex::new(syncer),
            watcher: Mutex::new(None),
            bus: EventBus::new(),
            stream,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            busy: tokio::sync::Mutex::new(()),
            server_reachable: AtomicBool::new(true),
            watcher_failures: AtomicU32::new(0),
            last_queue_status,
            last_sync: Mutex::new(None),
            last_reconcile: Mutex::new(None),
            start_time: Instant::now(),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
            subscriptions: Mutex::new(Vec::new()),
            lock_file,
        })
    }

    // ── status surface ────────────────────────────────────────────────

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            running: !self.cancel.is_cancelled(),
            server_reachable: self.server_reachable.load(Ordering::SeqCst),
            collections_watched: self.config.lock().collections.len(),
            pending_ops: self.syncer.lock().queue().pending(),
            watcher_alive: self.watcher.lock().as_ref().map(|w| w.alive()).unwrap_or(false),
            last_sync_at: *self.last_sync.lock(),
            last_reconcile_at: *self.last_reconcile.lock(),
        }
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        let config = self.config.lock();
        HealthSnapshot {
            status: self.status(),
            server_url: config.server.clone(),
            username: config.username.clone(),
            pid: std::process::id(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            updated_at: Utc::now(),
        }
    }

    pub fn server_url(&self) -> String {
        self.config.lock().server.clone()
    }

    pub fn username(&self) -> String {
        self.config.lock().username.clone()
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.config.lock().collections.clone()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn client(&self) -> ApiClient {
        self.client.lock().clone()
    }

    pub fn config_mutable(&self) -> bool {
        self.cfg.mutable_config
    }

    pub fn config_path(&self) -> &std::path::Path {
        &self.cfg.paths.config_path
    }

    pub fn queue_status(&self) -> Option<String> {
        self.last_queue_status.lock().clone()
    }

    /// Latest configuration with the token intact; API handlers must
    /// redact before serving.
    pub fn current_config(&self) -> Config {
        self.config.lock().clone()
    }

    // ── run loops ─────────────────────────────────────────────────────

    /// Start the engine: watcher, event pump, initial sync, and the
    /// three scheduled loops. Returns once the initial sync pass has
    /// completed and the first health snapshot is on disk.
    pub async fn run(self: &Arc<Self>) {
        // Stream every bus event onto the UDS change stream.
        let stream = Arc::clone(&self.stream);
        let sub = self.bus.subscribe(move |event| {
            stream.publish(StreamEvent::from_file_event(event, Utc::now()));
        });
        self.subscriptions.lock().push(sub);

        if let Err(e) = self.rebuild_watcher() {
            warn!(error = %e, "initial watcher construction failed");
        }

        // Event pump: watcher events fan out to the bus, then drive the
        // syncer.
        if let Some(mut rx) = self.event_rx.lock().take() {
            let this = Arc::clone(self);
            self.tasks.lock().spawn(async move {
                loop {
                    let event = tokio::select! {
                        _ = this.cancel.cancelled() => return,
                        event = rx.recv() => match event {
                            Some(event) => event,
                            None => return,
                        },
                    };
                    this.bus.emit(&event);
                    let syncer = Arc::clone(&*this.syncer.lock());
                    syncer.handle_event(&event).await;
                }
            });
        }

        // One full pass before the loops start.
        self.sync_pass(false).await;
        self.write_snapshot();

        self.spawn_config_watch();
        self.spawn_health_loop();
        self.spawn_reconcile_loop();

        info!("sync engine started");
    }

    /// Run a full sync pass under the busy guard; skipped entirely when
    /// a reload or another pass holds it.
    async fn sync_pass(&self, reconcile: bool) {
        let _guard = match self.busy.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("sync pass skipped, engine busy");
                return;
            }
        };
        let syncer = Arc::clone(&*self.syncer.lock());
        syncer.initial_sync().await;
        let now = Utc::now();
        *self.last_sync.lock() = Some(now);
        if reconcile {
            *self.last_reconcile.lock() = Some(now);
        }
    }

    fn spawn_config_watch(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let debounce = self.cfg.debounce;
        let config_dir = self.cfg.paths.config_dir.clone();
        let config_file = self.cfg.paths.config_path.clone();
        self.tasks.lock().spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let file_name = config_file.file_name().map(|n| n.to_os_string());
            let handler = move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| Some(n.to_os_string()) == file_name).unwrap_or(false));
                    if relevant {
                        let _ = tx.send(());
                    }
                }
            };
            let backend: Result<Box<dyn Watcher + Send>, notify::Error> = if env::force_poll() {
                PollWatcher::new(
                    handler,
                    NotifyConfig::default().with_poll_interval(Duration::from_millis(500)),
                )
                .map(|w| Box::new(w) as Box<dyn Watcher + Send>)
            } else {
                RecommendedWatcher::new(handler, NotifyConfig::default())
                    .map(|w| Box::new(w) as Box<dyn Watcher + Send>)
            };
            let mut backend = match backend {
                Ok(backend) => backend,
                Err(e) => {
                    error!(error = %e, "config watcher construction failed");
                    return;
                }
            };
            if let Err(e) = backend.watch(&config_dir, RecursiveMode::NonRecursive) {
                error!(error = %e, "config watch failed");
                return;
            }

            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    changed = rx.recv() => {
                        if changed.is_none() {
                            return;
                        }
                        // Debounce: wait for quiescence, swallowing bursts.
                        loop {
                            tokio::select! {
                                _ = this.cancel.cancelled() => return,
                                _ = tokio::time::sleep(debounce) => break,
                                more = rx.recv() => {
                                    if more.is_none() {
                                        return;
                                    }
                                }
                            }
                        }
                        this.reload().await;
                    }
                }
            }
        });
    }

    fn spawn_health_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let period = self.cfg.health_interval;
        self.tasks.lock().spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let remote = Arc::clone(&*this.remote.lock());
                        let reachable = remote.health().await;
                        this.server_reachable.store(reachable, Ordering::SeqCst);
                        this.ensure_watcher();
                        this.write_snapshot();
                    }
                }
            }
        });
    }

    fn spawn_reconcile_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let period = self.cfg.reconcile_interval;
        self.tasks.lock().spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        this.sync_pass(true).await;
                    }
                }
            }
        });
    }

    // ── watcher management ────────────────────────────────────────────

    /// Build a watcher over the current collections and install it.
    fn rebuild_watcher(&self) -> Result<(), LifecycleError> {
        let collections = self.config.lock().collections.clone();
        let event_tx = self.event_tx.clone();
        let on_event = move |event: FileEvent| {
            let _ = event_tx.send(event);
        };
        // State is already Closed when this fires; the health loop rebuilds.
        let on_error = |e: WatcherError| {
            warn!(error = %e, "watcher failed; will rebuild on next health tick");
        };
        let watcher = CollectionWatcher::spawn(
            collections,
            self.cfg.watcher_tuning,
            on_event,
            on_error,
        )?;
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Health-tick check: rebuild the watcher when it has closed.
    /// Repeated consecutive failures escalate from warning to error; the
    /// snapshot keeps showing `watcher_alive: false` either way.
    fn ensure_watcher(&self) {
        let alive = self.watcher.lock().as_ref().map(|w| w.alive()).unwrap_or(false);
        if alive {
            self.watcher_failures.store(0, Ordering::SeqCst);
            return;
        }
        match self.rebuild_watcher() {
            Ok(()) => {
                info!("watcher rebuilt");
                self.watcher_failures.store(0, Ordering::SeqCst);
            }
            Err(e) => {
                let failures = self.watcher_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= 2 {
                    error!(error = %e, failures, "watcher rebuild keeps failing");
                } else {
                    warn!(error = %e, "watcher rebuild failed");
                }
            }
        }
    }

    // ── config reload ─────────────────────────────────────────────────

    /// Re-read the configuration file and apply the difference.
    pub async fn reload(&self) {
        let _guard = self.busy.lock().await;

        let loaded = match Config::load(&self.cfg.paths.config_path) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "config reload failed; keeping previous configuration");
                return;
            }
        };
        let (normalized, removed) = loaded.normalize();
        for c in &removed {
            warn!(name = %c.name, path = %c.path.display(), "dropped overlapping collection on reload");
        }

        let old = self.config.lock().clone();
        if normalized == old {
            debug!("config unchanged after reload");
            return;
        }

        let core_changed = normalized.server != old.server
            || normalized.token != old.token
            || normalized.username != old.username;

        if core_changed {
            info!("core configuration changed; rebuilding client and syncer");
            let client = match ApiClient::new(&normalized.server, &normalized.token) {
                Ok(client) => client,
                Err(e) => {
                    warn!(error = %e, "new server config unusable; keeping previous configuration");
                    return;
                }
            };
            let remote: Arc<dyn RemoteApi> = Arc::new(client.clone());

            // The old queue dies with the old syncer.
            self.syncer.lock().queue().stop();
            let queue = RetryQueue::with_tuning(
                Arc::clone(&remote),
                queue_status_fn(Arc::clone(&self.last_queue_status)),
                self.cfg.queue_tuning,
            );
            let syncer = Arc::new(Syncer::new(
                normalized.username.clone(),
                normalized.collections.clone(),
                Arc::clone(&remote),
                queue,
            ));

            *self.config.lock() = normalized;
            *self.client.lock() = client;
            *self.remote.lock() = remote;
            *self.syncer.lock() = syncer;

            if let Err(e) = self.rebuild_watcher() {
                warn!(error = %e, "watcher rebuild after core change failed");
            }
            let syncer = Arc::clone(&*self.syncer.lock());
            syncer.initial_sync().await;
            *self.last_sync.lock() = Some(Utc::now());
            self.write_snapshot();
            return;
        }

        // Collection-only change: diff by name; a changed path counts as
        // remove + add.
        let old_by_name: HashMap<&str, &Collection> =
            old.collections.iter().map(|c| (c.name.as_str(), c)).collect();
        let new_by_name: HashMap<&str, &Collection> =
            normalized.collections.iter().map(|c| (c.name.as_str(), c)).collect();

        let removed_collections: Vec<Collection> = old
            .collections
            .iter()
            .filter(|c| new_by_name.get(c.name.as_str()).map(|n| n.path != c.path).unwrap_or(true))
            .cloned()
            .collect();
        let added_collections: Vec<Collection> = normalized
            .collections
            .iter()
            .filter(|c| old_by_name.get(c.name.as_str()).map(|o| o.path != c.path).unwrap_or(true))
            .cloned()
            .collect();

        info!(
            added = added_collections.len(),
            removed = removed_collections.len(),
            "collections changed; resyncing"
        );

        // Swap active collections, preserving the retry queue.
        let queue = self.syncer.lock().queue().clone();
        let remote = Arc::clone(&*self.remote.lock());
        let syncer = Arc::new(Syncer::new(
            normalized.username.clone(),
            normalized.collections.clone(),
            remote,
            queue,
        ));
        *self.config.lock() = normalized;
        *self.syncer.lock() = syncer;

        if let Err(e) = self.rebuild_watcher() {
            warn!(error = %e, "watcher rebuild after collection change failed");
        }

        let syncer = Arc::clone(&*self.syncer.lock());
        for c in &removed_collections {
            match syncer.purge_collection(&c.name).await {
                Ok(_) => self.stream.publish(StreamEvent::dir_delete(c, Utc::now())),
                Err(e) => warn!(collection = %c.name, error = %e, "purge failed"),
            }
        }
        for c in &added_collections {
            if let Err(e) = syncer.sync_collection(c).await {
                warn!(collection = %c.name, error = %e, "sync of added collection failed");
            }
        }
        *self.last_sync.lock() = Some(Utc::now());
        self.write_snapshot();
    }

    /// Apply a local-API collection mutation and persist it. The config
    /// watcher picks the saved file up and resyncs.
    pub fn apply_collection_change(
        &self,
        action: &str,
        name: Option<&str>,
        path: Option<&str>,
    ) -> Result<Config, sv_config::ConfigError> {
        let mut config = self.config.lock().clone();
        match action {
            "add" => {
                let path = path.ok_or_else(|| {
                    sv_config::ConfigError::Invalid("path is required for add".to_string())
                })?;
                config.add_collection(path, name)?;
            }
            "remove" => {
                let name = name.ok_or_else(|| {
                    sv_config::ConfigError::Invalid("name is required for remove".to_string())
                })?;
                config.remove_collection(name)?;
            }
            other => {
                return Err(sv_config::ConfigError::Invalid(format!("unknown action: {other}")))
            }
        }
        config.save(&self.cfg.paths.config_path)?;
        Ok(config)
    }

    // ── health / shutdown ─────────────────────────────────────────────

    fn write_snapshot(&self) {
        let snapshot = self.health_snapshot();
        if let Err(e) = write_health(&self.cfg.paths.health_path, &snapshot) {
            warn!(error = %e, "health snapshot write failed");
        }
    }

    /// Stop all loops, drain in-flight work under the deadline, write
    /// the final snapshot, and remove the runtime files.
    pub async fn shutdown(&self) {
        info!("shutting down sync engine...");
        self.cancel.cancel();

        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.close();
        }

        // Stop the queue flush timer; let an in-flight request finish.
        let syncer = Arc::clone(&*self.syncer.lock());
        let drained =
            tokio::time::timeout(self.cfg.drain_timeout, syncer.queue().shutdown()).await;
        if drained.is_err() {
            warn!("queue worker did not stop within drain deadline");
        }

        // Await the scheduled loops.
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let joined = tokio::time::timeout(self.cfg.drain_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if joined.is_err() {
            warn!("background tasks did not stop within drain deadline; aborting");
            tasks.abort_all();
        }

        self.subscriptions.lock().clear();
        self.stream.close();
        self.write_snapshot();

        // Runtime files: socket first, then the PID file. The lock
        // itself releases when the File drops with the supervisor.
        if self.cfg.paths.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.cfg.paths.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }
        if self.cfg.paths.pid_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.cfg.paths.pid_path) {
                warn!(error = %e, "failed to remove PID file");
            }
        }
        info!("sync engine stopped");
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Queue status lines go to the log and to the status surface.
fn queue_status_fn(slot: Arc<Mutex<Option<String>>>) -> crate::queue::StatusFn {
    Arc::new(move |line: &str| {
        info!(target: "sv_daemon::queue", "{line}");
        *slot.lock() = Some(line.to_string());
    })
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
