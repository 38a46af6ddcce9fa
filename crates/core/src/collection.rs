// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collections: named local directories synced under a server-side prefix.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a collection name.
pub const MAX_NAME_LEN: usize = 63;

/// A declared local directory synced under a named prefix.
///
/// The name is the first segment of every server path produced from this
/// collection; the path is an absolute local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub path: PathBuf,
}

impl Collection {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), path: path.into() }
    }

    /// True when `path` is this collection's root or lies underneath it.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }
}

/// Invalid collection name
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("collection name is empty")]
    Empty,

    #[error("collection name exceeds {MAX_NAME_LEN} characters: {0}")]
    TooLong(String),

    #[error("collection name contains invalid character {1:?}: {0}")]
    InvalidChar(String, char),
}

/// Validate a collection name: non-empty, at most 63 characters,
/// lowercase alphanumerics and hyphens only.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong(name.to_string()));
    }
    if let Some(c) = name.chars().find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-') {
        return Err(NameError::InvalidChar(name.to_string(), c));
    }
    Ok(())
}

/// Derive a collection name from a directory basename.
///
/// Lowercases, maps characters outside `[a-z0-9-]` to hyphens, and truncates
/// to the maximum name length. Returns `None` for paths without a basename
/// (e.g. `/`).
pub fn derive_name(path: &Path) -> Option<String> {
    let base = path.file_name()?.to_string_lossy();
    let mut name: String = base
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    name.truncate(MAX_NAME_LEN);
    let name = name.trim_matches('-').to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// True when `ancestor` is a proper ancestor directory of `path`
/// (equal paths are not ancestors).
pub fn is_strict_ancestor(ancestor: &Path, path: &Path) -> bool {
    path != ancestor && path.starts_with(ancestor)
}

#[cfg(test)]
#[path = "collection_tests.rs"]
mod tests;
