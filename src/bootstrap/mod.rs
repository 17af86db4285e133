//! Archive activation and dispatch
//!
//! Running an archive goes through these steps:
//!
//! 1. Read the embedded record and apply environment overrides
//! 2. Under the cache lock: refresh the cache directory when stale and
//!    install lazy dependencies when missing
//! 3. Activate any additional archives (`--zipapps=`)
//! 4. Install the merged search path into `PYTHONPATH`
//! 5. Exec or spawn the interpreter
//!
//! Cleanup requested by `clear_zipapps_cache` / `clear_zipapps_self` happens
//! after the child exits.

pub mod cache;
pub mod cleanup;
pub mod dispatch;
pub mod lazy;
pub mod lock;
pub mod search_path;
pub mod selection;

pub use cache::{CacheDir, CacheState};
pub use cleanup::ExitCleanup;
pub use dispatch::{DispatchMode, DispatchPlan, EntryPoint, Invocation, RuntimeFlags};
pub use lazy::{LazyInstaller, LazyStatus, LazyTarget};
pub use lock::CacheLock;
pub use search_path::SearchPath;
pub use selection::{MemberFilter, UnzipSelection};

use crate::archive::{layout, ArchiveReader};
use crate::config::{parse_chmod, BootstrapConfig, RuntimeOverrides};
use crate::error::{ZipappsError, ZipappsResult};
use crate::paths::{resolve, split_list, TokenContext};
use crate::toolchain::{PythonToolchain, SystemPython};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One activated archive
#[derive(Debug, Clone)]
pub struct Activation {
    pub archive: PathBuf,
    pub config: BootstrapConfig,
    /// Cache directory, when anything is extracted or lazily installed
    pub cache: Option<CacheDir>,
    pub lazy: Option<LazyTarget>,
    /// Token-resolved `sys_paths`
    pub sys_paths: Vec<PathBuf>,
}

impl Activation {
    /// This archive's own entries: lazy target, cache dir, archive
    pub fn entries(&self) -> Vec<PathBuf> {
        let mut entries = Vec::new();
        if let Some(ref lazy) = self.lazy {
            entries.push(lazy.dir.clone());
        }
        if let Some(ref cache) = self.cache {
            entries.push(cache.path().to_path_buf());
        }
        entries.push(self.archive.clone());
        entries
    }
}

/// Outcome of `Activator::launch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// `--activate-zipapps`: search path installed, nothing run
    Activated(OsString),
    /// Interpreter ran and exited with this code
    Exited(i32),
}

/// Prepares archives for import and dispatches into them
pub struct Activator {
    overrides: RuntimeOverrides,
    inherited: Option<OsString>,
    toolchain: Option<Arc<dyn PythonToolchain>>,
}

impl Activator {
    /// Activator reading overrides and `PYTHONPATH` from the process environment
    pub fn from_env() -> Self {
        Self::new(
            RuntimeOverrides::from_env(),
            std::env::var_os(search_path::PYTHONPATH),
        )
    }

    pub fn new(overrides: RuntimeOverrides, inherited: Option<OsString>) -> Self {
        Self {
            overrides,
            inherited,
            toolchain: None,
        }
    }

    /// Use a fixed toolchain instead of one built from each record's `python`
    pub fn with_toolchain(mut self, toolchain: Arc<dyn PythonToolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    fn toolchain_for(&self, config: &BootstrapConfig) -> Arc<dyn PythonToolchain> {
        match self.toolchain {
            Some(ref toolchain) => Arc::clone(toolchain),
            None => Arc::new(SystemPython::new(config.python.clone())),
        }
    }

    /// Activate a single archive: refresh its cache and lazy dependencies
    pub async fn activate(&self, archive: &Path) -> ZipappsResult<Activation> {
        let ctx = TokenContext::current(archive)?;
        let archive = if archive.is_absolute() {
            archive.to_path_buf()
        } else {
            ctx.cwd.join(archive)
        };

        let mut reader = ArchiveReader::open(&archive)?;
        let mut config = reader.bootstrap_config()?;
        self.overrides.apply(&mut config);
        debug!("Activating {} (build {})", archive.display(), config.ts);

        let mut selection = UnzipSelection::parse(&config.unzip);
        if config.is_lazy() {
            selection = selection.with_name(layout::LAZY_PIP_DIR_NAME);
        }
        let sys_paths: Vec<PathBuf> = split_list(&config.sys_paths)
            .iter()
            .map(|p| resolve(p, &ctx))
            .collect();

        if !selection.is_enabled() {
            return Ok(Activation {
                archive,
                config,
                cache: None,
                lazy: None,
                sys_paths,
            });
        }

        let chmod = parse_chmod(&config.chmod)?;
        let filter = MemberFilter::new(selection, &config.unzip_exclude);
        let mut cache = CacheDir::compute(&config.unzip_path, &ctx, &archive);

        let lock = CacheLock::acquire(cache.path(), self.overrides.lock_timeout()).await?;
        cache.ensure(&mut reader, &config.ts, &filter, chmod)?;

        let lazy = if config.is_lazy() {
            let toolchain = self.toolchain_for(&config);
            let installer = LazyInstaller::new(toolchain.as_ref(), cache.path());
            match installer.ensure(&config, self.overrides.lazy_reinstall).await {
                Ok(target) => Some(target),
                Err(e) => {
                    warn!("Skipping lazy dependencies of {}: {}", archive.display(), e);
                    None
                }
            }
        } else {
            None
        };
        drop(lock);

        Ok(Activation {
            archive,
            config,
            cache: Some(cache),
            lazy,
            sys_paths,
        })
    }

    /// Activate every archive in a comma separated list
    pub async fn activate_list(&self, list: &str) -> ZipappsResult<Vec<Activation>> {
        let cwd = std::env::current_dir()
            .map_err(|e| ZipappsError::io("getting current directory", e))?;
        let ctx = TokenContext::current(&cwd.join("_"))?;

        let mut activations = Vec::new();
        for item in split_list(list) {
            let path = resolve(&item, &ctx);
            activations.push(self.activate(&path).await?);
        }
        Ok(activations)
    }

    /// Merge activations into one search path:
    /// primary entries, other archives, primary `sys_paths`, then the
    /// inherited `PYTHONPATH` unless the primary is strict.
    pub fn search_path(&self, primary: &Activation, others: &[Activation]) -> SearchPath {
        let mut path = SearchPath::new();
        path.extend(primary.entries());
        for other in others {
            path.extend(other.entries());
            path.extend(other.sys_paths.iter().cloned());
        }
        path.extend(primary.sys_paths.iter().cloned());
        if !primary.config.ignore_system_python_path {
            path.extend(search_path::inherited_entries(self.inherited.as_deref()));
        }
        path
    }

    /// Run an archive with the arguments following it on the command line
    pub async fn launch(
        &self,
        archive: &Path,
        args: Vec<OsString>,
    ) -> ZipappsResult<LaunchOutcome> {
        let (flags, args) = RuntimeFlags::extract(args);

        let primary = self.activate(archive).await?;
        let env_paths = flags
            .zipapps
            .clone()
            .unwrap_or_else(|| primary.config.env_paths.clone());
        let others = self.activate_list(&env_paths).await?;

        let path = self.search_path(&primary, &others);
        let pythonpath = path.install()?;

        if flags.activate_only {
            info!("Activated {} without running it", primary.archive.display());
            return Ok(LaunchOutcome::Activated(pythonpath));
        }

        let cleanup = ExitCleanup::new(
            primary
                .cache
                .as_ref()
                .filter(|_| primary.config.clear_zipapps_cache)
                .map(CacheDir::path),
            Some(primary.archive.as_path()).filter(|_| primary.config.clear_zipapps_self),
        );
        let plan = DispatchPlan::new(&primary.config, args, cleanup.is_armed());
        let code = plan.run(OsStr::new(&pythonpath)).await?;
        drop(cleanup);

        Ok(LaunchOutcome::Exited(code))
    }
}
