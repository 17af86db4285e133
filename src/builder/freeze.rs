//! Resolve pip arguments into a pinned requirements list
//!
//! Packages are installed into a throwaway virtual environment and
//! `pip freeze` is captured. Installer output goes to stderr so that `-`
//! (stdout) only carries the requirements.

use crate::error::{ZipappsError, ZipappsResult};
use crate::toolchain::{run_checked, InstallOutput};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

const VENV_NAME: &str = "zipapps_venv";

pub struct FreezeTool {
    python: String,
}

impl FreezeTool {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    /// Install `pip_args` into a fresh venv and return its `pip freeze` output
    pub async fn freeze(&self, pip_args: &[String]) -> ZipappsResult<String> {
        if pip_args.is_empty() {
            return Err(ZipappsError::User(
                "freeze needs at least one pip argument".to_string(),
            ));
        }

        let temp = tempfile::Builder::new()
            .prefix("zipapps_")
            .tempdir()
            .map_err(|e| ZipappsError::io("creating temp directory", e))?;
        let venv = temp.path().join(VENV_NAME);

        info!("Creating virtual environment {}", venv.display());
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "venv"]).arg(&venv);
        run_checked(cmd, format!("{} -m venv", self.python), InstallOutput::Stderr).await?;

        let python = venv_python(&venv);
        info!("Installing {:?} into the virtual environment", pip_args);
        let mut cmd = Command::new(&python);
        cmd.args(["-m", "pip", "install"]).args(pip_args);
        run_checked(cmd, "venv pip install".to_string(), InstallOutput::Stderr).await?;

        let output = Command::new(&python)
            .args(["-m", "pip", "freeze"])
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| ZipappsError::command_failed("venv pip freeze", e))?;
        if !output.status.success() {
            return Err(ZipappsError::CommandStatus {
                command: "venv pip freeze".to_string(),
                code: output.status.code().unwrap_or(-1),
            });
        }

        Ok(normalize(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Freeze and write the result to `output`, or stdout for `-`
    pub async fn freeze_to(&self, pip_args: &[String], output: &str) -> ZipappsResult<String> {
        let frozen = self.freeze(pip_args).await?;
        if output == "-" {
            println!("{}", frozen);
        } else {
            eprintln!("{}", frozen);
            tokio::fs::write(output, format!("{}\n", frozen))
                .await
                .map_err(|e| ZipappsError::io(format!("writing {}", output), e))?;
        }
        Ok(frozen)
    }
}

fn venv_python(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// Collapse blank lines and CRs, trim
fn normalize(raw: &str) -> String {
    raw.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
