//! Cache directory state management
//!
//! The cache directory holds members extracted from an archive. It is keyed
//! by the archive stem and tied to one build through the `_zip_time_<ts>`
//! marker: when the marker of the running archive is missing, the directory
//! is stale and gets repopulated. The lazy-install subdirectory survives a
//! repopulation.

use crate::archive::layout;
use crate::archive::ArchiveReader;
use crate::bootstrap::selection::MemberFilter;
use crate::error::{ZipappsError, ZipappsResult};
use crate::paths::{resolve, TokenContext};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const REMOVE_ATTEMPTS: usize = 3;

/// State of a cache directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Missing or stale (marker absent)
    Cold,
    /// Being cleared and extracted
    Populating,
    /// Marker for the running build present
    Ready,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cold => write!(f, "cold"),
            Self::Populating => write!(f, "populating"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Per-archive cache directory
#[derive(Debug, Clone)]
pub struct CacheDir {
    path: PathBuf,
    state: CacheState,
}

impl CacheDir {
    /// `<resolved template>/<archive stem>`
    pub fn compute(template: &str, ctx: &TokenContext, archive: &Path) -> Self {
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string());
        Self::at(resolve(template, ctx).join(stem))
    }

    /// Cache directory at an explicit path
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            state: CacheState::Cold,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Directory holding lazy-install targets
    pub fn lazy_dir(&self) -> PathBuf {
        self.path.join(layout::LAZY_PIP_DIR_NAME)
    }

    fn marker_path(&self, ts: &str) -> PathBuf {
        self.path.join(layout::timestamp_marker(ts))
    }

    /// Whether the cache belongs to the build stamped `ts`. Only the
    /// marker's existence counts.
    pub fn is_fresh(&self, ts: &str) -> bool {
        self.marker_path(ts).is_file()
    }

    /// Check freshness and repopulate when stale. Returns whether the
    /// directory was (re)populated.
    pub fn ensure(
        &mut self,
        reader: &mut ArchiveReader,
        ts: &str,
        filter: &MemberFilter,
        chmod: Option<u32>,
    ) -> ZipappsResult<bool> {
        if self.is_fresh(ts) {
            debug!("Cache {} is fresh", self.path.display());
            self.state = CacheState::Ready;
            return Ok(false);
        }
        self.populate(reader, ts, filter, chmod)?;
        Ok(true)
    }

    /// Clear everything except the lazy-install directory, extract the
    /// selected members, apply `chmod` and finally write the marker.
    pub fn populate(
        &mut self,
        reader: &mut ArchiveReader,
        ts: &str,
        filter: &MemberFilter,
        chmod: Option<u32>,
    ) -> ZipappsResult<()> {
        self.state = CacheState::Populating;
        info!("Refreshing cache {}", self.path.display());

        self.clear()?;
        fs::create_dir_all(&self.path).map_err(|e| {
            ZipappsError::io(format!("creating cache directory {}", self.path.display()), e)
        })?;

        let extracted = reader.extract_matching(&self.path, |name| filter.matches(name))?;
        if let Some(mode) = chmod {
            for path in &extracted {
                apply_mode(path, mode)?;
            }
        }

        let marker = self.marker_path(ts);
        fs::write(&marker, b"")
            .map_err(|e| ZipappsError::io(format!("writing marker {}", marker.display()), e))?;

        self.state = CacheState::Ready;
        debug!(
            "Cache {} ready with {} extracted file(s)",
            self.path.display(),
            extracted.len()
        );
        Ok(())
    }

    fn clear(&self) -> ZipappsResult<()> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(ZipappsError::io(
                    format!("reading cache directory {}", self.path.display()),
                    e,
                ))
            }
        };

        for entry in entries.flatten() {
            if entry.file_name() == layout::LAZY_PIP_DIR_NAME {
                continue;
            }
            if !remove_path(&entry.path()) {
                warn!("Could not remove stale cache entry {}", entry.path().display());
            }
        }
        Ok(())
    }
}

/// Remove a file or directory tree, retrying a few times.
/// A path that is already gone counts as removed.
pub fn remove_path(path: &Path) -> bool {
    for attempt in 1..=REMOVE_ATTEMPTS {
        let result = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => return true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) => debug!(
                "Removing {} failed (attempt {}/{}): {}",
                path.display(),
                attempt,
                REMOVE_ATTEMPTS,
                e
            ),
        }
    }
    false
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> ZipappsResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| ZipappsError::io(format!("setting mode of {}", path.display()), e))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> ZipappsResult<()> {
    Ok(())
}
