//! Python toolchain abstraction
//!
//! Everything zipapps needs from a Python installation goes through the
//! `PythonToolchain` trait: probing the interpreter, making sure pip is
//! importable, installing into a target directory and byte-compiling a tree.
//! `SystemPython` drives a real interpreter through tokio child processes.

use crate::error::{ZipappsError, ZipappsResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Interpreter version slice and platform name keying lazy-install targets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    /// `sys.version_info` truncated, e.g. `3.11`
    pub version: String,
    /// `platform.system()`, e.g. `Linux`
    pub platform: String,
}

impl TargetKey {
    /// Directory name of this target below the lazy-install directory
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.version, self.platform)
    }
}

/// Where the installer's stdout goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutput {
    /// Share the parent's stdout (build time)
    Inherit,
    /// Relay stdout lines to stderr so program output stays clean (run time)
    Stderr,
}

/// A `pip install --target` request
#[derive(Debug, Clone)]
pub struct InstallRequest<'a> {
    pub target: &'a Path,
    pub args: &'a [String],
    pub cwd: Option<&'a Path>,
    pub output: InstallOutput,
}

/// Abstract Python toolchain
#[async_trait]
pub trait PythonToolchain: Send + Sync {
    /// Query the version (truncated to `version_slice` components) and platform
    async fn probe(&self, version_slice: usize) -> ZipappsResult<TargetKey>;

    /// Make pip importable, bootstrapping it with ensurepip if needed
    async fn ensure_pip(&self) -> ZipappsResult<()>;

    /// Run `pip install --target <target> <args>`
    async fn pip_install(&self, request: &InstallRequest<'_>) -> ZipappsResult<()>;

    /// Byte-compile every source below `dir`, `.pyc` next to each `.py`
    async fn compile_all(&self, dir: &Path) -> ZipappsResult<()>;
}

/// A Python interpreter found on the system
#[derive(Debug, Clone)]
pub struct SystemPython {
    python: String,
}

impl SystemPython {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.python)
    }
}

#[async_trait]
impl PythonToolchain for SystemPython {
    async fn probe(&self, version_slice: usize) -> ZipappsResult<TargetKey> {
        let script = format!(
            "import platform, sys; \
             print('.'.join(map(str, sys.version_info[:{}]))); \
             print(platform.system() or '-')",
            version_slice
        );
        let output = self
            .command()
            .args(["-c", &script])
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .output()
            .await
            .map_err(|e| ZipappsError::PythonProbe {
                python: self.python.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ZipappsError::PythonProbe {
                python: self.python.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_probe(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            ZipappsError::PythonProbe {
                python: self.python.clone(),
                reason: "unexpected probe output".to_string(),
            }
        })
    }

    async fn ensure_pip(&self) -> ZipappsResult<()> {
        let has_pip = self
            .command()
            .args(["-c", "import pip"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        if has_pip {
            return Ok(());
        }

        warn!("pip is not importable by {}, bootstrapping with ensurepip", self.python);
        let mut cmd = self.command();
        cmd.args(["-m", "ensurepip", "--default-pip"]);
        run_checked(cmd, format!("{} -m ensurepip", self.python), InstallOutput::Stderr).await
    }

    async fn pip_install(&self, request: &InstallRequest<'_>) -> ZipappsResult<()> {
        let target = request.target.display().to_string();
        let mut cmd = self.command();
        cmd.args(["-m", "pip", "install", "--target", &target])
            .args(request.args);
        if let Some(cwd) = request.cwd {
            cmd.current_dir(cwd);
        }

        info!("Installing {:?} into {}", request.args, target);
        let label = format!("{} -m pip install --target {}", self.python, target);
        match run_checked(cmd, label, request.output).await {
            Err(ZipappsError::CommandStatus { code, .. }) => {
                Err(ZipappsError::InstallFailed { code })
            }
            other => other,
        }
    }

    async fn compile_all(&self, dir: &Path) -> ZipappsResult<()> {
        let mut cmd = self.command();
        cmd.args(["-m", "compileall", "-q", "-b"]).arg(dir);
        run_checked(cmd, format!("{} -m compileall", self.python), InstallOutput::Inherit).await
    }
}

/// Run a command to completion, failing on a non-zero exit.
pub(crate) async fn run_checked(
    mut cmd: Command,
    label: String,
    output: InstallOutput,
) -> ZipappsResult<()> {
    debug!("Executing: {}", label);
    cmd.stdin(Stdio::null()).stderr(Stdio::inherit());

    let status = match output {
        InstallOutput::Inherit => cmd
            .stdout(Stdio::inherit())
            .status()
            .await
            .map_err(|e| ZipappsError::command_failed(&label, e))?,
        InstallOutput::Stderr => {
            let mut child = cmd
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|e| ZipappsError::command_failed(&label, e))?;
            if let Some(stdout) = child.stdout.take() {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    eprintln!("{}", line);
                }
            }
            child
                .wait()
                .await
                .map_err(|e| ZipappsError::command_failed(&label, e))?
        }
    };

    if status.success() {
        Ok(())
    } else {
        Err(ZipappsError::CommandStatus {
            command: label,
            code: status.code().unwrap_or(-1),
        })
    }
}

fn parse_probe(stdout: &str) -> Option<TargetKey> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let version = lines.next()?.to_string();
    let platform = lines.next()?.to_string();
    Some(TargetKey { version, platform })
}
