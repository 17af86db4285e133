//! Configuration management for zipapps

pub mod env;
pub mod schema;

pub use env::RuntimeOverrides;
pub use schema::{parse_chmod, BootstrapConfig, BuildConfig};

use crate::error::{ZipappsError, ZipappsResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Loads and dumps build configurations as JSON
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for a JSON file
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Load a build configuration from the JSON file
    pub async fn load(&self) -> ZipappsResult<BuildConfig> {
        let content = fs::read_to_string(&self.config_path).await.map_err(|e| {
            ZipappsError::io(
                format!("reading config from {}", self.config_path.display()),
                e,
            )
        })?;

        serde_json::from_str(&content).map_err(|e| ZipappsError::ConfigInvalid {
            path: self.config_path.clone(),
            reason: e.to_string(),
        })
    }

    /// Write a build configuration; a path of `-` means stdout
    pub async fn dump(&self, config: &BuildConfig) -> ZipappsResult<()> {
        let content = serde_json::to_string(config)?;

        if self.config_path == Path::new("-") {
            println!("{}", content);
            return Ok(());
        }

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    ZipappsError::io(format!("creating directory {}", parent.display()), e)
                })?;
            }
        }

        fs::write(&self.config_path, content).await.map_err(|e| {
            ZipappsError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }
}
