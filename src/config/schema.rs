//! Configuration schema for zipapps
//!
//! `BuildConfig` is the single build configuration object; CLI flags, a JSON
//! file (`--load-config`) and direct construction are interchangeable ways of
//! producing it. `BootstrapConfig` is the subset embedded into every archive
//! and read back by the activator at run time.

use crate::error::{ZipappsError, ZipappsResult};
use serde::{Deserialize, Serialize};

/// Default archive path
pub const DEFAULT_OUTPUT_PATH: &str = "app.pyz";

/// Default cache directory template
pub const DEFAULT_UNZIP_PATH: &str = "zipapps_cache";

/// Default cache directory template in lazy-install mode
pub const DEFAULT_LAZY_UNZIP_PATH: &str = "$SELF/zipapps_cache";

/// Default patterns purged from the staging tree before sealing
pub const DEFAULT_RM_PATTERNS: &str = "*.dist-info,__pycache__";

/// Python executable used when none is configured
pub fn default_python() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

/// Build configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Files and directories copied into the staging root (comma separated)
    pub includes: String,

    /// Staging directory; a private temp dir is used when unset
    pub cache_path: Option<String>,

    /// Entry point: `module`, `module:function` or a raw statement
    pub main: String,

    /// Archive output path
    pub output: String,

    /// Shebang interpreter written at the head of the archive
    pub interpreter: Option<String>,

    /// Python executable used for pip at build time and dispatch at run time
    pub python: String,

    /// Deflate members instead of storing them
    pub compressed: bool,

    /// Run passthrough commands through the system shell
    pub shell: bool,

    /// Call `main` in a child interpreter instead of replacing the launcher
    pub main_shell: bool,

    /// Members extracted to disk at run time (`*`, `AUTO` or names)
    pub unzip: String,

    /// Members never extracted, even if selected by `unzip`
    pub unzip_exclude: String,

    /// Cache directory template, supports path tokens
    pub unzip_path: String,

    /// Drop the inherited PYTHONPATH at run time
    pub ignore_system_python_path: bool,

    /// Arguments forwarded verbatim to `pip install`
    pub pip_args: Vec<String>,

    /// Precompile staged sources to bytecode
    pub compiled: bool,

    /// Fingerprint input enabling build-skip
    pub build_id: String,

    /// Default archives activated before dispatch
    pub env_paths: String,

    /// Install dependencies on first run instead of at build time
    pub lazy_install: bool,

    /// Extra search paths inserted at run time
    pub sys_paths: String,

    /// Bootstrap pip with ensurepip before the build-time install
    pub ensure_pip: bool,

    /// Version components keying lazy-install targets
    pub python_version_slice: usize,

    /// Layout without bootstrap files for embedding in another unit
    pub layer_mode: bool,

    /// Directory prefix used in layer mode
    pub layer_mode_prefix: String,

    /// Remove the cache directory after running
    pub clear_zipapps_cache: bool,

    /// Remove the archive itself after running
    pub clear_zipapps_self: bool,

    /// Octal permission bits applied to extracted files
    pub chmod: String,

    /// Glob patterns purged from staging before sealing (comma separated)
    pub rm_patterns: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            includes: String::new(),
            cache_path: None,
            main: String::new(),
            output: DEFAULT_OUTPUT_PATH.to_string(),
            interpreter: None,
            python: default_python(),
            compressed: false,
            shell: false,
            main_shell: false,
            unzip: String::new(),
            unzip_exclude: String::new(),
            unzip_path: String::new(),
            ignore_system_python_path: false,
            pip_args: vec![],
            compiled: false,
            build_id: String::new(),
            env_paths: String::new(),
            lazy_install: false,
            sys_paths: String::new(),
            ensure_pip: false,
            python_version_slice: 2,
            layer_mode: false,
            layer_mode_prefix: "python".to_string(),
            clear_zipapps_cache: false,
            clear_zipapps_self: false,
            chmod: String::new(),
            rm_patterns: DEFAULT_RM_PATTERNS.to_string(),
        }
    }
}

impl BuildConfig {
    /// Effective cache directory template
    pub fn effective_unzip_path(&self) -> String {
        if !self.unzip_path.is_empty() {
            self.unzip_path.clone()
        } else if self.lazy_install {
            DEFAULT_LAZY_UNZIP_PATH.to_string()
        } else {
            DEFAULT_UNZIP_PATH.to_string()
        }
    }
}

/// Parse octal permission bits such as `755`; empty means unset
pub fn parse_chmod(value: &str) -> ZipappsResult<Option<u32>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let digits = value.strip_prefix("0o").unwrap_or(value);
    match u32::from_str_radix(digits, 8) {
        Ok(mode) if mode <= 0o7777 => Ok(Some(mode)),
        _ => Err(ZipappsError::InvalidChmod(value.to_string())),
    }
}

/// Run-time parameters embedded into an archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Generation timestamp of the build
    pub ts: String,
    pub unzip: String,
    pub unzip_exclude: String,
    pub unzip_path: String,
    pub ignore_system_python_path: bool,
    pub sys_paths: String,
    pub env_paths: String,
    pub main: String,
    pub main_shell: bool,
    pub shell: bool,
    pub python: String,

    /// Lazy-install pip arguments; empty when installed at build time
    pub lazy_pip_args: Vec<String>,

    /// Digest of `lazy_pip_args`, names the install marker
    pub lazy_pip_digest: String,

    pub python_version_slice: usize,
    pub clear_zipapps_cache: bool,
    pub clear_zipapps_self: bool,
    pub chmod: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            ts: String::new(),
            unzip: String::new(),
            unzip_exclude: String::new(),
            unzip_path: DEFAULT_UNZIP_PATH.to_string(),
            ignore_system_python_path: false,
            sys_paths: String::new(),
            env_paths: String::new(),
            main: String::new(),
            main_shell: false,
            shell: false,
            python: default_python(),
            lazy_pip_args: vec![],
            lazy_pip_digest: String::new(),
            python_version_slice: 2,
            clear_zipapps_cache: false,
            clear_zipapps_self: false,
            chmod: String::new(),
        }
    }
}

impl BootstrapConfig {
    /// Whether dependencies are installed on first run
    pub fn is_lazy(&self) -> bool {
        !self.lazy_pip_args.is_empty()
    }
}
