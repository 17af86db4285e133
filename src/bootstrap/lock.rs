//! Cross-process lock around cache population
//!
//! Several processes may start the same archive at once. The one holding the
//! lock checks staleness, repopulates and lazily installs; the others wait
//! (bounded) and then find a fresh cache.

use crate::error::{ZipappsError, ZipappsResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive advisory lock on `.<stem>.zipapps.lock` next to a cache directory.
/// Released on drop.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Lock file path for a cache directory
    pub fn lock_path(cache_dir: &Path) -> PathBuf {
        let stem = cache_dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string());
        let name = format!(".{}.zipapps.lock", stem);
        match cache_dir.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Acquire the lock, polling until `timeout` elapses
    pub async fn acquire(cache_dir: &Path, timeout: Duration) -> ZipappsResult<Self> {
        let path = Self::lock_path(cache_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ZipappsError::io(format!("creating directory {}", parent.display()), e)
            })?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ZipappsError::io(format!("opening lock {}", path.display()), e))?;

        let started = Instant::now();
        let mut announced = false;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!("Acquired cache lock {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {}
                Err(e) => {
                    return Err(ZipappsError::io(format!("locking {}", path.display()), e))
                }
            }

            if started.elapsed() >= timeout {
                return Err(ZipappsError::CacheLockTimeout {
                    path,
                    waited_secs: timeout.as_secs(),
                });
            }
            if !announced {
                info!("Waiting for another process to finish preparing the cache");
                announced = true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to release cache lock {}: {}", self.path.display(), e);
        }
    }
}
