//! Environment variable overrides for the embedded bootstrap record
//!
//! Every archive can be re-pointed at run time without rebuilding it.

use crate::config::schema::BootstrapConfig;
use std::time::Duration;

pub const ENV_UNZIP: &str = "ZIPAPPS_UNZIP";
pub const ENV_UNZIP_EXCLUDE: &str = "ZIPAPPS_UNZIP_EXCLUDE";
pub const ENV_CACHE: &str = "ZIPAPPS_CACHE";
pub const ENV_UNZIP_PATH: &str = "UNZIP_PATH";
pub const ENV_STRICT_PYTHON_PATH: &str = "ZIPAPPS_STRICT_PYTHON_PATH";
pub const ENV_PYTHON_VERSION_SLICE: &str = "ZIPAPPS_PYTHON_VERSION_SLICE";
pub const ENV_CLEAR_CACHE: &str = "CLEAR_ZIPAPPS_CACHE";
pub const ENV_CLEAR_SELF: &str = "CLEAR_ZIPAPPS_SELF";
pub const ENV_CHMOD: &str = "ZIPAPPS_CHMOD";
pub const ENV_PYTHON: &str = "ZIPAPPS_PYTHON";
pub const ENV_LAZY_REINSTALL: &str = "ZIPAPPS_LAZY_REINSTALL";
pub const ENV_LOCK_TIMEOUT: &str = "ZIPAPPS_LOCK_TIMEOUT";

/// Default bounded wait for the cache lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(120);

/// Values read from the environment; `None` keeps the embedded value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeOverrides {
    pub unzip: Option<String>,
    pub unzip_exclude: Option<String>,
    pub unzip_path: Option<String>,
    pub strict_python_path: Option<bool>,
    pub python_version_slice: Option<usize>,
    pub clear_cache: Option<bool>,
    pub clear_self: Option<bool>,
    pub chmod: Option<String>,
    pub python: Option<String>,
    pub lazy_reinstall: bool,
    pub lock_timeout: Option<Duration>,
}

impl RuntimeOverrides {
    /// Read overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            unzip: get(ENV_UNZIP),
            unzip_exclude: get(ENV_UNZIP_EXCLUDE),
            unzip_path: get(ENV_CACHE).or_else(|| get(ENV_UNZIP_PATH)),
            strict_python_path: get(ENV_STRICT_PYTHON_PATH).map(|v| parse_flag(&v)),
            python_version_slice: get(ENV_PYTHON_VERSION_SLICE)
                .and_then(|v| v.trim().parse().ok()),
            clear_cache: get(ENV_CLEAR_CACHE).map(|v| parse_flag(&v)),
            clear_self: get(ENV_CLEAR_SELF).map(|v| parse_flag(&v)),
            chmod: get(ENV_CHMOD),
            python: get(ENV_PYTHON),
            lazy_reinstall: get(ENV_LAZY_REINSTALL).is_some_and(|v| parse_flag(&v)),
            lock_timeout: get(ENV_LOCK_TIMEOUT)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        }
    }

    /// Apply the overrides on top of an embedded record
    pub fn apply(&self, config: &mut BootstrapConfig) {
        if let Some(ref v) = self.unzip {
            config.unzip = v.clone();
        }
        if let Some(ref v) = self.unzip_exclude {
            config.unzip_exclude = v.clone();
        }
        if let Some(ref v) = self.unzip_path {
            config.unzip_path = v.clone();
        }
        if let Some(v) = self.strict_python_path {
            config.ignore_system_python_path = v;
        }
        if let Some(v) = self.python_version_slice {
            config.python_version_slice = v;
        }
        if let Some(v) = self.clear_cache {
            config.clear_zipapps_cache = v;
        }
        if let Some(v) = self.clear_self {
            config.clear_zipapps_self = v;
        }
        if let Some(ref v) = self.chmod {
            config.chmod = v.clone();
        }
        if let Some(ref v) = self.python {
            config.python = v.clone();
        }
    }

    /// Effective bounded wait for the cache lock
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout.unwrap_or(DEFAULT_LOCK_TIMEOUT)
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}
