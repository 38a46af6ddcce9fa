// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration model: load, save, normalize, mutate.
//!
//! Mutations are pure on the in-memory model; persistence is explicit via
//! [`Config::save`].

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use sv_core::{derive_name, is_strict_ancestor, validate_name, Collection, NameError};

/// The daemon's declared configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Remote server base URL.
    pub server: String,
    /// Bearer token for the remote API.
    pub token: String,
    /// Remote namespace owned by this user.
    pub username: String,
    /// Declared collections, in file order.
    #[serde(default)]
    pub collections: Vec<Collection>,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {0}")]
    Missing(PathBuf),

    #[error("config file is malformed: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("path already configured as a collection: {0}")]
    AlreadyConfigured(PathBuf),

    #[error("path is inside existing collection \"{parent}\"")]
    OverlapChild { parent: String },

    #[error("collection name already in use: {0}")]
    DuplicateName(String),

    #[error("{0}")]
    InvalidName(#[from] NameError),

    #[error("no collection named \"{0}\"")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("could not determine home directory")]
    NoHome,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of [`Config::add_collection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// The collection that was inserted.
    pub added: Collection,
    /// Existing collections removed because the new path is their ancestor.
    pub removed_children: Vec<Collection>,
}

impl Config {
    /// Load and parse the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing(path.to_path_buf()))
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        serde_json::from_slice(&bytes).map_err(ConfigError::Malformed)
    }

    /// Persist the configuration atomically (temp file + rename), creating
    /// parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(self).map_err(ConfigError::Malformed)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Prune duplicate and overlapping collections, keeping first
    /// occurrences and ancestors. Returns the pruned configuration and the
    /// removed entries. Idempotent.
    pub fn normalize(mut self) -> (Self, Vec<Collection>) {
        let mut removed = Vec::new();

        // Duplicate paths: keep the first occurrence.
        let mut by_path: Vec<Collection> = Vec::with_capacity(self.collections.len());
        for c in self.collections.drain(..) {
            if by_path.iter().any(|kept| kept.path == c.path) {
                removed.push(c);
            } else {
                by_path.push(c);
            }
        }

        // Overlaps: drop any entry nested under another entry's path.
        let mut survivors: Vec<Collection> = Vec::with_capacity(by_path.len());
        for c in &by_path {
            let nested = by_path.iter().any(|other| is_strict_ancestor(&other.path, &c.path));
            if nested {
                removed.push(c.clone());
            } else {
                survivors.push(c.clone());
            }
        }

        // Duplicate names among survivors: keep the first occurrence.
        let mut collections: Vec<Collection> = Vec::with_capacity(survivors.len());
        for c in survivors {
            if collections.iter().any(|kept| kept.name == c.name) {
                removed.push(c);
            } else {
                collections.push(c);
            }
        }

        for c in &removed {
            warn!(name = %c.name, path = %c.path.display(), "pruned overlapping collection");
        }

        self.collections = collections;
        (self, removed)
    }

    /// Insert a collection, deriving the name from the path basename when
    /// omitted. Removes (and reports) existing collections the new path is
    /// an ancestor of.
    pub fn add_collection(
        &mut self,
        path: impl AsRef<Path>,
        name: Option<&str>,
    ) -> Result<AddOutcome, ConfigError> {
        let path = resolve_path(path.as_ref())?;

        if self.collections.iter().any(|c| c.path == path) {
            return Err(ConfigError::AlreadyConfigured(path));
        }
        if let Some(parent) = self.collections.iter().find(|c| is_strict_ancestor(&c.path, &path)) {
            return Err(ConfigError::OverlapChild { parent: parent.name.clone() });
        }

        // Adopt: the new path may be an ancestor of existing collections.
        let (removed_children, retained): (Vec<_>, Vec<_>) = self
            .collections
            .drain(..)
            .partition(|c| is_strict_ancestor(&path, &c.path));
        self.collections = retained;

        let name = match name {
            Some(n) => n.to_string(),
            None => derive_name(&path).ok_or(NameError::Empty)?,
        };
        validate_name(&name)?;
        if self.collections.iter().any(|c| c.name == name) {
            return Err(ConfigError::DuplicateName(name));
        }

        let added = Collection::new(name, path);
        self.collections.push(added.clone());
        Ok(AddOutcome { added, removed_children })
    }

    /// Remove the collection with the given name.
    pub fn remove_collection(&mut self, name: &str) -> Result<Collection, ConfigError> {
        let idx = self
            .collections
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ConfigError::NotFound(name.to_string()))?;
        Ok(self.collections.remove(idx))
    }
}

/// Expand `~`, join relative paths onto the current directory, and clean
/// `.`/`..` components lexically.
fn resolve_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let expanded = if let Ok(rest) = path.strip_prefix("~") {
        dirs::home_dir().ok_or(ConfigError::NoHome)?.join(rest)
    } else {
        path.to_path_buf()
    };
    let absolute =
        if expanded.is_absolute() { expanded } else { std::env::current_dir()?.join(expanded) };

    let mut clean = PathBuf::new();
    for comp in absolute.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }
    Ok(clean)
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
