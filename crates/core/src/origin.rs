// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Origin timestamps attached to uploads.
//!
//! Linux filesystems frequently report a birth time of 0; a creation
//! header derived from it would sort every file before every other one,
//! so a zero or missing ctime falls back to the modification time, then
//! to the current time. Every client that sends the origin headers must
//! apply the same rule.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};

/// Milliseconds since the Unix epoch for a `SystemTime`.
pub fn system_time_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Current time in milliseconds since the Unix epoch.
pub fn epoch_ms() -> u64 {
    system_time_ms(SystemTime::now())
}

/// Render epoch milliseconds as an ISO-8601 instant (UTC).
pub fn iso_ms(ms: u64) -> String {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Resolve the effective origin creation time in epoch milliseconds.
///
/// Zero (the Unix epoch) and absent values count as missing.
pub fn resolve_origin_ctime(ctime_ms: Option<u64>, mtime_ms: Option<u64>, now_ms: u64) -> u64 {
    match ctime_ms {
        Some(c) if c > 0 => c,
        _ => match mtime_ms {
            Some(m) if m > 0 => m,
            _ => now_ms,
        },
    }
}

#[cfg(test)]
#[path = "origin_tests.rs"]
mod tests;
