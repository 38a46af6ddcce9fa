// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::time::Duration;

/// Force the polling watcher backend even when native notifications are
/// available. Needed on overlay filesystems where inotify is unreliable.
pub fn force_poll() -> bool {
    std::env::var("SEEDVAULT_FORCE_POLL").map(|v| !v.is_empty() && v != "0").unwrap_or(false)
}

/// Health snapshot interval (default 5s).
pub fn health_interval() -> Duration {
    duration_ms("SEEDVAULT_HEALTH_INTERVAL_MS", Duration::from_secs(5))
}

/// Periodic reconciliation interval (default 5 minutes).
pub fn reconcile_interval() -> Duration {
    duration_ms("SEEDVAULT_RECONCILE_INTERVAL_MS", Duration::from_secs(300))
}

/// Watcher write-burst debounce (default 300ms). Also used for the
/// config-file change debounce.
pub fn debounce() -> Duration {
    duration_ms("SEEDVAULT_DEBOUNCE_MS", Duration::from_millis(300))
}

/// Shutdown drain timeout (default 5s).
pub fn drain_timeout() -> Duration {
    duration_ms("SEEDVAULT_DRAIN_TIMEOUT_MS", Duration::from_secs(5))
}

/// Local API port (loopback only).
pub fn api_port() -> u16 {
    std::env::var("SEEDVAULT_API_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8787)
}

fn duration_ms(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
