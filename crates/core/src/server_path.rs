// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validated `<collection>/<relative-posix-path>` strings.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collection::{validate_name, Collection, NameError};

/// A normalized server path: `<collection-name>/<relative>.md`.
///
/// Always relative (no leading slash), forward slashes only, no `..` or
/// empty segments, and the first segment is a valid collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerPath(String);

/// Invalid server path
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerPathError {
    #[error("server path is empty")]
    Empty,

    #[error("server path must not start with '/': {0}")]
    Absolute(String),

    #[error("server path contains backslash: {0}")]
    Backslash(String),

    #[error("server path contains empty segment: {0}")]
    EmptySegment(String),

    #[error("server path contains '..' segment: {0}")]
    ParentSegment(String),

    #[error("server path must name a file under a collection: {0}")]
    MissingRelative(String),

    #[error("server path must end in .md: {0}")]
    NotMarkdown(String),

    #[error("invalid collection prefix in {0}: {1}")]
    BadCollection(String, NameError),
}

impl ServerPath {
    /// Parse and validate a server path string.
    pub fn parse(s: impl Into<String>) -> Result<Self, ServerPathError> {
        let s = s.into();
        if s.is_empty() {
            return Err(ServerPathError::Empty);
        }
        if s.starts_with('/') {
            return Err(ServerPathError::Absolute(s));
        }
        if s.contains('\\') {
            return Err(ServerPathError::Backslash(s));
        }
        let segments: Vec<&str> = s.split('/').collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(ServerPathError::EmptySegment(s));
        }
        if segments.iter().any(|seg| *seg == "..") {
            return Err(ServerPathError::ParentSegment(s));
        }
        if segments.len() < 2 {
            return Err(ServerPathError::MissingRelative(s));
        }
        if !s.ends_with(".md") {
            return Err(ServerPathError::NotMarkdown(s));
        }
        if let Err(e) = validate_name(segments[0]) {
            return Err(ServerPathError::BadCollection(s, e));
        }
        Ok(Self(s))
    }

    /// Map a local absolute path to its server path under `collection`.
    ///
    /// Returns `None` when the path lies outside the collection root, is the
    /// root itself, or does not form a valid server path (non-`.md`,
    /// non-UTF-8 components).
    pub fn from_local(collection: &Collection, local: &Path) -> Option<Self> {
        let rel = local.strip_prefix(&collection.path).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }
        let mut joined = collection.name.clone();
        for comp in rel.components() {
            joined.push('/');
            joined.push_str(comp.as_os_str().to_str()?);
        }
        Self::parse(joined).ok()
    }

    /// The collection name (first segment).
    pub fn collection(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    /// The path relative to the collection root.
    pub fn relative(&self) -> &str {
        self.0.split_once('/').map(|(_, rest)| rest).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ServerPath {
    type Error = ServerPathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<ServerPath> for String {
    fn from(p: ServerPath) -> Self {
        p.0
    }
}

impl AsRef<str> for ServerPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "server_path_tests.rs"]
mod tests;
