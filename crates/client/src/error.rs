// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client error taxonomy.
//!
//! The retry queue keys its behavior on the distinction between semantic
//! failures (a reachable server refused the request) and transport
//! failures (the request may never have arrived). 5xx counts as transport:
//! the server is unhealthy and the operation is worth retrying.

use thiserror::Error;

/// Errors from the remote API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Network, DNS, TLS, or timeout failure; the server was not reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The configured server URL could not be parsed.
    #[error("invalid server URL: {0}")]
    BadUrl(String),
}

impl ClientError {
    /// 4xx: the server understood and refused. Never retried.
    pub fn is_semantic(&self) -> bool {
        matches!(self, Self::Api { status, .. } if (400..500).contains(status))
    }

    /// 401/403: the operator must reconfigure credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == 401 || *status == 403)
    }

    /// Everything worth retrying with backoff.
    pub fn is_transport(&self) -> bool {
        !self.is_semantic()
    }

    /// The HTTP status, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
