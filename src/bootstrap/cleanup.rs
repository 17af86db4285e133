//! Best-effort removal of the cache directory and the archive after a run

use crate::bootstrap::cache::remove_path;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Guard that removes the configured paths when dropped. Errors are logged
/// and swallowed.
#[derive(Debug, Default)]
pub struct ExitCleanup {
    paths: Vec<PathBuf>,
}

impl ExitCleanup {
    pub fn new(cache_dir: Option<&Path>, archive: Option<&Path>) -> Self {
        Self {
            paths: cache_dir
                .into_iter()
                .chain(archive)
                .map(Path::to_path_buf)
                .collect(),
        }
    }

    /// Whether anything will be removed
    pub fn is_armed(&self) -> bool {
        !self.paths.is_empty()
    }
}

impl Drop for ExitCleanup {
    fn drop(&mut self) {
        for path in &self.paths {
            if remove_path(path) {
                debug!("Removed {}", path.display());
            } else {
                warn!("Failed to remove {}", path.display());
            }
        }
    }
}
