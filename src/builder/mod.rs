//! Archive builder
//!
//! Turns a `BuildConfig` into a sealed archive:
//!
//! 1. Validate the configuration
//! 2. Skip the build when the existing output carries the same fingerprint
//! 3. Stage includes and dependencies (or record them for lazy install)
//! 4. Purge `rm_patterns`, optionally byte-compile
//! 5. Resolve the unzip selection (`AUTO` → native extension modules)
//! 6. Write the bootstrap files, or relocate the tree in layer mode
//! 7. Seal

pub mod freeze;
pub mod pip_args;
pub mod staging;

pub use freeze::FreezeTool;
pub use pip_args::LazyArgs;
pub use staging::Staging;

use crate::archive::{archive_has_member, layout, seal, BuildFingerprint, SealStats};
use crate::bootstrap::dispatch::{is_dotted_name, is_identifier};
use crate::bootstrap::{MemberFilter, UnzipSelection};
use crate::config::{parse_chmod, BootstrapConfig, BuildConfig};
use crate::error::{ZipappsError, ZipappsResult};
use crate::paths::{split_includes, split_list};
use crate::toolchain::{InstallOutput, InstallRequest, PythonToolchain, SystemPython};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const AUTO_TOKENS: [&str; 2] = ["AUTO", "AUTO_UNZIP"];

/// Result of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { path: PathBuf, stats: SealStats },
    /// Output already matches the build fingerprint
    Skipped(PathBuf),
}

impl BuildOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Built { path, .. } | Self::Skipped(path) => path,
        }
    }
}

pub struct Builder {
    config: BuildConfig,
    toolchain: Arc<dyn PythonToolchain>,
}

impl Builder {
    pub fn new(config: BuildConfig) -> Self {
        let toolchain = Arc::new(SystemPython::new(config.python.clone()));
        Self { config, toolchain }
    }

    pub fn with_toolchain(mut self, toolchain: Arc<dyn PythonToolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Checks that need no filesystem work beyond reading the output name
    pub fn validate(&self) -> ZipappsResult<()> {
        let output = Path::new(&self.config.output);
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !is_identifier(&stem) {
            return Err(ZipappsError::InvalidOutputName { name: stem });
        }

        pip_args::check_no_target(&self.config.pip_args)?;
        parse_chmod(&self.config.chmod)?;

        if let Some((module, function)) = self.config.main.trim().split_once(':') {
            let module = module.strip_suffix(".py").unwrap_or(module);
            if is_dotted_name(module) && !is_dotted_name(function) {
                return Err(ZipappsError::InvalidEntryPoint(self.config.main.clone()));
            }
        }
        Ok(())
    }

    pub async fn build(&self) -> ZipappsResult<BuildOutcome> {
        self.validate()?;
        let config = &self.config;
        let output = PathBuf::from(&config.output);

        let fingerprint = BuildFingerprint::compute(&config.build_id)?;
        if let Some(ref fp) = fingerprint {
            if archive_has_member(&output, &fp.marker_name()) {
                info!(
                    "{} is up to date (build id {}), skipping",
                    output.display(),
                    fp.digest()
                );
                return Ok(BuildOutcome::Skipped(output));
            }
        }

        let staging = Staging::prepare(config.cache_path.as_deref())?;
        let root = staging.root();
        debug!("Staging in {}", root.display());
        staging.clear_bookkeeping()?;
        staging.copy_includes(&split_includes(&config.includes))?;

        let lazy = self.stage_dependencies(root).await?;

        staging.purge(&config.rm_patterns)?;
        if config.compiled {
            self.toolchain.compile_all(root).await?;
        }

        let unzip = resolve_unzip(
            &config.unzip,
            &config.unzip_exclude,
            &staging.native_members(),
            !lazy.is_empty(),
        );

        let interpreter = if config.layer_mode {
            staging.relocate_under(&config.layer_mode_prefix)?;
            None
        } else {
            let ts = layout::generation_timestamp();
            let record = self.bootstrap_record(root, ts.clone(), unzip, lazy);
            write_bookkeeping(root, &ts, fingerprint.as_ref(), &record, config)?;
            config.interpreter.as_deref().filter(|i| !i.trim().is_empty())
        };

        let stats = seal(root, &output, interpreter, config.compressed)?;
        info!("Sealed {} ({} files)", output.display(), stats.files);
        Ok(BuildOutcome::Built { path: output, stats })
    }

    /// Install dependencies into staging, or stage them for a lazy install.
    /// Returns the pip arguments to run at first start (empty when eager).
    async fn stage_dependencies(&self, root: &Path) -> ZipappsResult<LazyArgs> {
        let config = &self.config;
        if config.pip_args.is_empty() {
            return Ok(LazyArgs::default());
        }

        if config.lazy_install {
            let lazy = pip_args::stage_requirement_files(&config.pip_args, root)?;
            info!("Deferring install of {:?} to first run", lazy.args);
            return Ok(lazy);
        }

        if config.ensure_pip {
            self.toolchain.ensure_pip().await?;
        }
        let request = InstallRequest {
            target: root,
            args: &config.pip_args,
            cwd: None,
            output: InstallOutput::Inherit,
        };
        self.toolchain.pip_install(&request).await?;
        Ok(LazyArgs::default())
    }

    fn bootstrap_record(
        &self,
        root: &Path,
        ts: String,
        unzip: String,
        lazy: LazyArgs,
    ) -> BootstrapConfig {
        let config = &self.config;
        BootstrapConfig {
            ts,
            unzip,
            unzip_exclude: config.unzip_exclude.clone(),
            unzip_path: config.effective_unzip_path(),
            ignore_system_python_path: config.ignore_system_python_path,
            sys_paths: config.sys_paths.clone(),
            env_paths: config.env_paths.clone(),
            main: normalize_main(&config.main, root),
            main_shell: config.main_shell,
            shell: config.shell,
            python: config.python.clone(),
            lazy_pip_digest: lazy.digest,
            lazy_pip_args: lazy.args,
            python_version_slice: config.python_version_slice,
            clear_zipapps_cache: config.clear_zipapps_cache,
            clear_zipapps_self: config.clear_zipapps_self,
            chmod: config.chmod.clone(),
        }
    }
}

/// Replace `AUTO` with the top-level names of native extension members, add
/// the lazy-install directory when needed, and warn about native members
/// that would stay inside the archive.
pub fn resolve_unzip(unzip: &str, exclude: &str, natives: &[String], lazy: bool) -> String {
    let requested = split_list(unzip);
    let auto = requested.iter().any(|n| AUTO_TOKENS.contains(&n.as_str()));

    let mut names: Vec<String> = requested
        .into_iter()
        .filter(|n| !AUTO_TOKENS.contains(&n.as_str()))
        .collect();
    if auto {
        let tops = staging::top_level_names(natives);
        debug!("AUTO unzip resolved to {:?}", tops);
        names.extend(tops);
    }
    if lazy {
        names.push(layout::LAZY_PIP_DIR_NAME.to_string());
    }

    let mut seen = BTreeSet::new();
    names.retain(|n| seen.insert(n.clone()));
    let unzip = names.join(",");

    let filter = MemberFilter::new(UnzipSelection::parse(&unzip), exclude);
    let missed: BTreeSet<String> = staging::top_level_names(
        &natives
            .iter()
            .filter(|m| !filter.matches(m))
            .cloned()
            .collect::<Vec<_>>(),
    );
    if !missed.is_empty() {
        warn!(
            "Native extension modules can not be imported from inside the archive; \
             consider --unzip={} (or AUTO)",
            missed.into_iter().collect::<Vec<_>>().join(",")
        );
    }
    unzip
}

/// `main.py:run` → `main:run` when `main.py` is a staged file
fn normalize_main(main: &str, root: &Path) -> String {
    let main = main.trim();
    let (module, rest) = match main.split_once(':') {
        Some((module, function)) => (module, Some(function)),
        None => (main, None),
    };
    let module = match module.strip_suffix(".py") {
        Some(stripped) if root.join(module).is_file() => stripped,
        _ => module,
    };
    match rest {
        Some(function) => format!("{}:{}", module, function),
        None => module.to_string(),
    }
}

fn write_bookkeeping(
    root: &Path,
    ts: &str,
    fingerprint: Option<&BuildFingerprint>,
    record: &BootstrapConfig,
    config: &BuildConfig,
) -> ZipappsResult<()> {
    let write = |name: &str, content: &[u8]| {
        let path = root.join(name);
        fs::write(&path, content)
            .map_err(|e| ZipappsError::io(format!("writing {}", path.display()), e))
    };

    write(&layout::timestamp_marker(ts), b"")?;
    if let Some(fp) = fingerprint {
        write(&fp.marker_name(), b"")?;
    }
    write(layout::MAIN_STUB_NAME, layout::MAIN_STUB.as_bytes())?;
    write(
        layout::BOOTSTRAP_RECORD_NAME,
        &serde_json::to_vec_pretty(record)?,
    )?;
    write(layout::BUILD_CONFIG_NAME, &serde_json::to_vec_pretty(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveReader;
    use crate::bootstrap::lazy::install_digest;
    use crate::bootstrap::Activator;
    use crate::config::RuntimeOverrides;
    use crate::toolchain::fake::FakeToolchain;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> BuildConfig {
        BuildConfig {
            output: dir.join("app.pyz").display().to_string(),
            ..Default::default()
        }
    }

    fn builder(config: BuildConfig) -> (Builder, Arc<FakeToolchain>) {
        let toolchain = Arc::new(FakeToolchain::default());
        let builder = Builder::new(config).with_toolchain(toolchain.clone());
        (builder, toolchain)
    }

    #[test]
    fn rejects_invalid_output_name() {
        let config = BuildConfig {
            output: "my-app.pyz".to_string(),
            ..Default::default()
        };
        let err = Builder::new(config).validate().unwrap_err();
        assert!(matches!(err, ZipappsError::InvalidOutputName { .. }));
    }

    #[tokio::test]
    async fn rejects_target_before_installing() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig {
            pip_args: vec!["six".to_string(), "--target=/x".to_string()],
            ..config_in(dir.path())
        };
        let (builder, toolchain) = builder(config);

        let err = builder.build().await.unwrap_err();
        assert!(matches!(err, ZipappsError::TargetArgConflict { .. }));
        assert_eq!(toolchain.installs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejects_malformed_entry_point() {
        let config = BuildConfig {
            main: "pkg.mod:not-a-name".to_string(),
            ..Default::default()
        };
        let err = Builder::new(config).validate().unwrap_err();
        assert!(matches!(err, ZipappsError::InvalidEntryPoint(_)));
    }

    #[tokio::test]
    async fn builds_archive_with_record() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("main.py");
        fs::write(&src, "def run(): pass\n").unwrap();
        let config = BuildConfig {
            includes: src.display().to_string(),
            main: "main.py:run".to_string(),
            unzip: "six".to_string(),
            pip_args: vec!["six".to_string()],
            ..config_in(dir.path())
        };
        let (builder, toolchain) = builder(config);

        let outcome = builder.build().await.unwrap();
        assert!(matches!(outcome, BuildOutcome::Built { .. }));
        assert_eq!(toolchain.installs.load(Ordering::SeqCst), 1);

        let mut reader = ArchiveReader::open(outcome.path()).unwrap();
        let names = reader.member_names();
        assert!(names.contains(&"main.py".to_string()));
        assert!(names.contains(&"six.py".to_string()));
        assert!(names.contains(&layout::MAIN_STUB_NAME.to_string()));
        assert!(names.contains(&layout::BUILD_CONFIG_NAME.to_string()));

        let record = reader.bootstrap_config().unwrap();
        assert_eq!(record.main, "main:run");
        assert_eq!(record.unzip, "six");
        assert_eq!(record.unzip_path, "zipapps_cache");
        assert!(!record.is_lazy());
        assert!(reader.has_member(&layout::timestamp_marker(&record.ts)));
    }

    #[tokio::test]
    async fn missing_include_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig {
            includes: dir.path().join("nope").display().to_string(),
            ..config_in(dir.path())
        };
        let err = builder(config).0.build().await.unwrap_err();
        assert!(matches!(err, ZipappsError::IncludeNotFound(_)));
        assert!(!dir.path().join("app.pyz").exists());
    }

    #[tokio::test]
    async fn identical_build_id_skips_rebuild() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig {
            build_id: "release-1".to_string(),
            pip_args: vec!["six".to_string()],
            ..config_in(dir.path())
        };
        let (builder, toolchain) = builder(config);

        assert!(matches!(builder.build().await.unwrap(), BuildOutcome::Built { .. }));
        let before = fs::read(dir.path().join("app.pyz")).unwrap();
        assert!(matches!(builder.build().await.unwrap(), BuildOutcome::Skipped(_)));
        let after = fs::read(dir.path().join("app.pyz")).unwrap();

        assert_eq!(before, after);
        assert_eq!(toolchain.installs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lazy_mode_defers_install() {
        let dir = TempDir::new().unwrap();
        let req = dir.path().join("requirements.txt");
        fs::write(&req, "six\n").unwrap();
        let config = BuildConfig {
            lazy_install: true,
            pip_args: vec!["-r".to_string(), req.display().to_string()],
            ..config_in(dir.path())
        };
        let (builder, toolchain) = builder(config);

        let outcome = builder.build().await.unwrap();
        assert_eq!(toolchain.installs.load(Ordering::SeqCst), 0);

        let mut reader = ArchiveReader::open(outcome.path()).unwrap();
        assert!(reader.has_member("_zipapps_lazy_pip/requirements.txt"));
        let record = reader.bootstrap_config().unwrap();
        assert_eq!(
            record.lazy_pip_args,
            vec!["--requirement", "_zipapps_lazy_pip/requirements.txt"]
        );
        assert_eq!(
            record.lazy_pip_digest,
            install_digest(&record.lazy_pip_args, &[b"six\n".to_vec()])
        );
        assert_eq!(record.unzip, layout::LAZY_PIP_DIR_NAME);
        assert_eq!(record.unzip_path, "$SELF/zipapps_cache");
    }

    #[tokio::test]
    async fn edited_requirements_reinstall_lazy_dependencies() {
        let dir = TempDir::new().unwrap();
        let req = dir.path().join("requirements.txt");
        fs::write(&req, "six==1.15.0\n").unwrap();
        let config = BuildConfig {
            lazy_install: true,
            pip_args: vec!["-r".to_string(), req.display().to_string()],
            ..config_in(dir.path())
        };
        let (builder, toolchain) = builder(config);
        let activator =
            Activator::new(RuntimeOverrides::default(), None).with_toolchain(toolchain.clone());

        let archive = builder.build().await.unwrap().path().to_path_buf();
        let first = ArchiveReader::open(&archive).unwrap().bootstrap_config().unwrap();
        activator.activate(&archive).await.unwrap();
        activator.activate(&archive).await.unwrap();
        assert_eq!(toolchain.installs.load(Ordering::SeqCst), 1);

        fs::write(&req, "six==1.16.0\n").unwrap();
        let archive = builder.build().await.unwrap().path().to_path_buf();
        let second = ArchiveReader::open(&archive).unwrap().bootstrap_config().unwrap();
        activator.activate(&archive).await.unwrap();

        assert_eq!(first.lazy_pip_args, second.lazy_pip_args);
        assert_ne!(first.lazy_pip_digest, second.lazy_pip_digest);
        assert_eq!(toolchain.installs.load(Ordering::SeqCst), 2);
        let staged = dir.path().join("zipapps_cache/app/_zipapps_lazy_pip/requirements.txt");
        assert_eq!(fs::read_to_string(staged).unwrap(), "six==1.16.0\n");
    }

    #[tokio::test]
    async fn layer_mode_has_no_bootstrap_files() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig {
            output: dir.path().join("layer.zip").display().to_string(),
            layer_mode: true,
            pip_args: vec!["six".to_string()],
            interpreter: Some("/usr/bin/python3".to_string()),
            ..Default::default()
        };
        let (builder, _) = builder(config);

        let outcome = builder.build().await.unwrap();
        let bytes = fs::read(outcome.path()).unwrap();
        assert!(!bytes.starts_with(b"#!"));

        let reader = ArchiveReader::open(outcome.path()).unwrap();
        let names = reader.member_names();
        assert!(names.contains(&"python/six.py".to_string()));
        assert!(names.iter().all(|n| !layout::is_bookkeeping(n)));
        assert!(!names.contains(&layout::MAIN_STUB_NAME.to_string()));
    }

    #[tokio::test]
    async fn compiled_build_runs_compileall() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig {
            compiled: true,
            ..config_in(dir.path())
        };
        let (builder, toolchain) = builder(config);
        builder.build().await.unwrap();
        assert_eq!(toolchain.compiles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn auto_unzip_selects_native_modules() {
        let natives = vec!["lxml/etree.so".to_string(), "_cffi.pyd".to_string()];
        assert_eq!(resolve_unzip("AUTO", "", &natives, false), "_cffi,lxml");
        assert_eq!(resolve_unzip("six,AUTO_UNZIP", "", &natives, false), "six,_cffi,lxml");
        assert_eq!(resolve_unzip("*", "", &natives, true), "*,_zipapps_lazy_pip");
        assert_eq!(resolve_unzip("", "", &[], false), "");
    }

    #[test]
    fn main_extension_stripped_only_for_staged_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("server.py"), "").unwrap();
        assert_eq!(normalize_main("server.py:main", dir.path()), "server:main");
        assert_eq!(normalize_main("server.py", dir.path()), "server");
        assert_eq!(normalize_main("other.py", dir.path()), "other.py");
        assert_eq!(normalize_main("pkg.cli:main", dir.path()), "pkg.cli:main");
    }
}
