//! Ordered module search path handed to the interpreter
//!
//! The path is assembled in precedence order and then installed once into
//! `PYTHONPATH`, which the launched interpreter turns into its `sys.path`.

use crate::error::{ZipappsError, ZipappsResult};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PYTHONPATH: &str = "PYTHONPATH";

/// Ordered, duplicate-free list of search path entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    entries: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry unless it is already present. Returns whether it was added.
    pub fn push(&mut self, entry: impl Into<PathBuf>) -> bool {
        let entry = entry.into();
        if entry.as_os_str().is_empty() || self.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn extend<I, P>(&mut self, entries: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn contains(&self, entry: &Path) -> bool {
        self.entries.iter().any(|e| e == entry)
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Platform-joined value for `PYTHONPATH`
    pub fn to_env(&self) -> ZipappsResult<OsString> {
        std::env::join_paths(&self.entries)
            .map_err(|e| ZipappsError::User(format!("Invalid search path entry: {}", e)))
    }

    /// Make this the process search path. Every interpreter started
    /// afterwards inherits it.
    pub fn install(&self) -> ZipappsResult<OsString> {
        let value = self.to_env()?;
        debug!("{}={}", PYTHONPATH, value.to_string_lossy());
        std::env::set_var(PYTHONPATH, &value);
        Ok(value)
    }
}

/// Entries of an inherited `PYTHONPATH` value, empty segments dropped
pub fn inherited_entries(value: Option<&OsStr>) -> Vec<PathBuf> {
    value
        .map(|v| {
            std::env::split_paths(v)
                .filter(|p| !p.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default()
}
