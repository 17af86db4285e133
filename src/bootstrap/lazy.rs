//! Lazy dependency installation on first run
//!
//! Dependencies of a lazy archive are installed into
//! `<cache>/_zipapps_lazy_pip/<version>_<platform>` the first time the archive
//! runs on a given interpreter. A marker named after the digest of the pip
//! arguments records a successful install, so changing the arguments forces a
//! fresh one.

use crate::archive::layout;
use crate::config::BootstrapConfig;
use crate::error::{ZipappsError, ZipappsResult};
use crate::toolchain::{InstallOutput, InstallRequest, PythonToolchain, TargetKey};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Digest of the lazy pip arguments; names the install marker
pub fn pip_args_digest(args: &[String]) -> String {
    install_digest(args, &[])
}

/// Digest of the lazy pip arguments and the contents of the requirement
/// files they point at, so editing a staged file forces a reinstall
pub fn install_digest(args: &[String], files: &[Vec<u8>]) -> String {
    let mut hasher = Sha256::new();
    for arg in args {
        hasher.update(arg.as_bytes());
        hasher.update([0u8]);
    }
    for content in files {
        hasher.update([1u8]);
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(content);
    }
    hex::encode(&hasher.finalize()[..16])
}

/// Result of preparing the lazy-install target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyStatus {
    /// Marker present, nothing installed
    UpToDate,
    /// Installed now, marker written
    Installed,
    /// Installer failed; no marker, retried next run
    Failed,
}

/// The per-interpreter install target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LazyTarget {
    pub key: TargetKey,
    pub dir: PathBuf,
    pub status: LazyStatus,
}

pub struct LazyInstaller<'a> {
    toolchain: &'a dyn PythonToolchain,
    cache_dir: PathBuf,
}

impl<'a> LazyInstaller<'a> {
    pub fn new(toolchain: &'a dyn PythonToolchain, cache_dir: &Path) -> Self {
        Self {
            toolchain,
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Ensure the dependencies recorded in `config` are installed for the
    /// running interpreter. Install failures are logged and reported as
    /// `LazyStatus::Failed`; only probe and filesystem errors are returned.
    pub async fn ensure(
        &self,
        config: &BootstrapConfig,
        reinstall: bool,
    ) -> ZipappsResult<LazyTarget> {
        let key = self.toolchain.probe(config.python_version_slice).await?;
        let dir = self
            .cache_dir
            .join(layout::LAZY_PIP_DIR_NAME)
            .join(key.dir_name());
        let marker = dir.join(marker_name(config));

        if marker.is_file() && !reinstall {
            debug!("Lazy dependencies up to date in {}", dir.display());
            ensure_dir(&dir)?;
            return Ok(LazyTarget {
                key,
                dir,
                status: LazyStatus::UpToDate,
            });
        }

        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| {
                ZipappsError::io(format!("clearing lazy target {}", dir.display()), e)
            })?;
        }
        ensure_dir(&dir)?;

        info!("Installing dependencies into {}", dir.display());
        let status = match self.install(config, &dir).await {
            Ok(()) => {
                fs::write(&marker, b"").map_err(|e| {
                    ZipappsError::io(format!("writing marker {}", marker.display()), e)
                })?;
                LazyStatus::Installed
            }
            Err(e) => {
                warn!("Lazy install failed, continuing without it: {}", e);
                LazyStatus::Failed
            }
        };

        Ok(LazyTarget { key, dir, status })
    }

    async fn install(&self, config: &BootstrapConfig, dir: &Path) -> ZipappsResult<()> {
        self.toolchain.ensure_pip().await?;
        let request = InstallRequest {
            target: dir,
            args: &config.lazy_pip_args,
            cwd: Some(&self.cache_dir),
            output: InstallOutput::Stderr,
        };
        self.toolchain.pip_install(&request).await
    }
}

fn marker_name(config: &BootstrapConfig) -> String {
    if config.lazy_pip_digest.is_empty() {
        pip_args_digest(&config.lazy_pip_args)
    } else {
        config.lazy_pip_digest.clone()
    }
}

fn ensure_dir(dir: &Path) -> ZipappsResult<()> {
    fs::create_dir_all(dir)
        .map_err(|e| ZipappsError::io(format!("creating directory {}", dir.display()), e))
}
