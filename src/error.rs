//! Error types for zipapps
//!
//! All modules use `ZipappsResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for zipapps operations
pub type ZipappsResult<T> = Result<T, ZipappsError>;

/// All errors that can occur while building or activating an archive
#[derive(Error, Debug)]
pub enum ZipappsError {
    // Configuration errors
    #[error("Invalid output name '{name}': must be a valid Python identifier")]
    InvalidOutputName { name: String },

    #[error("pip install target '{arg}' conflicts with the staging directory")]
    TargetArgConflict { arg: String },

    #[error("Include path does not exist: {0}")]
    IncludeNotFound(PathBuf),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid entry point '{0}'")]
    InvalidEntryPoint(String),

    #[error("Invalid chmod value '{0}': expected octal permission bits like 755")]
    InvalidChmod(String),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // Archive errors
    #[error("Archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("Archive {0} has no bootstrap record (built in layer mode?)")]
    BootstrapRecordMissing(PathBuf),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // Cache errors
    #[error("Timed out after {waited_secs}s waiting for cache lock {path}")]
    CacheLockTimeout { path: PathBuf, waited_secs: u64 },

    // Python toolchain errors
    #[error("Dependency installation failed with exit code {code}")]
    InstallFailed { code: i32 },

    #[error("Failed to query Python interpreter {python}: {reason}")]
    PythonProbe { python: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with code {code}: {command}")]
    CommandStatus { command: String, code: i32 },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("{0}")]
    User(String),
}

impl ZipappsError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::TargetArgConflict { .. } => {
                Some("Use --cache-path to choose where dependencies are staged")
            }
            Self::InvalidOutputName { .. } => {
                Some("Use letters, digits and underscores, e.g. -o my_app.pyz")
            }
            Self::BootstrapRecordMissing(_) => {
                Some("Layer-mode archives are meant to be unpacked by their host, not run")
            }
            Self::CacheLockTimeout { .. } => {
                Some("Another process is populating the cache; raise ZIPAPPS_LOCK_TIMEOUT")
            }
            Self::PythonProbe { .. } => Some("Set ZIPAPPS_PYTHON to a working interpreter"),
            _ => None,
        }
    }
}
