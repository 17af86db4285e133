//! Run-time path tokens
//!
//! Cache paths and extra search paths may contain symbolic tokens that are
//! only known when an archive actually runs:
//!
//! | Token | Resolves to |
//! |-------|-------------|
//! | `$HOME` | the user's home directory |
//! | `$TEMP` | the system temp directory |
//! | `$SELF` | the directory containing the archive |
//! | `$PID` | the current process id |
//! | `$CWD` | the current working directory |

use crate::error::{ZipappsError, ZipappsResult};
use std::path::{Path, PathBuf};

/// Values the tokens resolve to, captured once per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContext {
    pub home: PathBuf,
    pub temp: PathBuf,
    pub self_dir: PathBuf,
    pub pid: u32,
    pub cwd: PathBuf,
}

impl TokenContext {
    /// Capture the live values for an archive at `archive`
    pub fn current(archive: &Path) -> ZipappsResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| ZipappsError::io("getting current directory", e))?;
        let archive = absolute(archive, &cwd);
        let self_dir = archive
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.clone());

        Ok(Self {
            home: dirs::home_dir().unwrap_or_else(|| cwd.clone()),
            temp: std::env::temp_dir(),
            self_dir,
            pid: std::process::id(),
            cwd,
        })
    }

    fn value(&self, token: &str) -> Option<String> {
        let value = match token {
            "HOME" => self.home.display().to_string(),
            "TEMP" => self.temp.display().to_string(),
            "SELF" => self.self_dir.display().to_string(),
            "CWD" => self.cwd.display().to_string(),
            "PID" => self.pid.to_string(),
            _ => return None,
        };
        Some(value)
    }
}

const TOKENS: [&str; 5] = ["HOME", "TEMP", "SELF", "PID", "CWD"];

/// Resolve a token-bearing template into an absolute path.
///
/// `$TOKEN` is substituted anywhere in the template. A bare `HOME`, `TEMP`
/// or `SELF` at the very start is accepted as a legacy prefix.
pub fn resolve(template: &str, ctx: &TokenContext) -> PathBuf {
    let template = template.trim();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    if let Some(prefix) = ["HOME", "TEMP", "SELF"]
        .iter()
        .find(|p| rest.starts_with(**p))
    {
        let tail = &rest[prefix.len()..];
        if tail.is_empty() || tail.starts_with(['/', '\\']) {
            if let Some(value) = ctx.value(prefix) {
                out.push_str(&value);
            }
            rest = tail;
        }
    }

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        match TOKENS.iter().find(|t| after.starts_with(**t)) {
            Some(token) => {
                if let Some(value) = ctx.value(token) {
                    out.push_str(&value);
                }
                rest = &after[token.len()..];
            }
            None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    absolute(Path::new(&out), &ctx.cwd)
}

/// Split a comma separated option into trimmed, non-empty items
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Split an includes option, which also accepts whitespace separators
pub fn split_includes(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn absolute(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
