//! Checks and rewrites applied to the arguments forwarded to pip

use crate::archive::layout;
use crate::bootstrap::lazy::install_digest;
use crate::error::{ZipappsError, ZipappsResult};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Reject install-target flags; zipapps chooses the target itself
pub fn check_no_target(args: &[String]) -> ZipappsResult<()> {
    match args
        .iter()
        .find(|a| *a == "--target" || a.starts_with("--target=") || a.starts_with("-t"))
    {
        Some(arg) => Err(ZipappsError::TargetArgConflict { arg: arg.clone() }),
        None => Ok(()),
    }
}

const FILE_FLAGS: [(&str, &str); 2] = [("-r", "--requirement"), ("-c", "--constraint")];

/// Pip arguments deferred to the first run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LazyArgs {
    pub args: Vec<String>,
    /// Covers the arguments and the staged file contents
    pub digest: String,
}

impl LazyArgs {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Copy requirement and constraint files into the lazy-install directory of
/// `staging` and point the arguments at the copies. The copies are addressed
/// relative to the cache directory, which is the installer's working
/// directory at run time.
pub fn stage_requirement_files(args: &[String], staging: &Path) -> ZipappsResult<LazyArgs> {
    let lazy_dir = staging.join(layout::LAZY_PIP_DIR_NAME);
    fs::create_dir_all(&lazy_dir)
        .map_err(|e| ZipappsError::io(format!("creating {}", lazy_dir.display()), e))?;

    let mut used = BTreeSet::new();
    let mut contents = Vec::new();
    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match split_file_flag(arg) {
            Some((flag, FileArg::Next)) => {
                out.push(flag.to_string());
                if let Some(file) = iter.next() {
                    out.push(stage_one(file, &lazy_dir, &mut used, &mut contents)?);
                }
            }
            Some((flag, FileArg::Inline(file))) => {
                let staged = stage_one(file, &lazy_dir, &mut used, &mut contents)?;
                out.push(format!("{}={}", flag, staged));
            }
            None => out.push(arg.clone()),
        }
    }

    let digest = install_digest(&out, &contents);
    Ok(LazyArgs { args: out, digest })
}

enum FileArg<'a> {
    Next,
    Inline(&'a str),
}

/// `-r f`, `-rf`, `--requirement f`, `--requirement=f` (same for constraints).
/// Returns the long flag name.
fn split_file_flag(arg: &str) -> Option<(&'static str, FileArg<'_>)> {
    for (short, long) in FILE_FLAGS {
        if arg == short || arg == long {
            return Some((long, FileArg::Next));
        }
        if let Some(file) = arg.strip_prefix(long).and_then(|r| r.strip_prefix('=')) {
            return Some((long, FileArg::Inline(file)));
        }
        if let Some(file) = arg.strip_prefix(short).filter(|f| !f.is_empty()) {
            return Some((long, FileArg::Inline(file)));
        }
    }
    None
}

fn stage_one(
    file: &str,
    lazy_dir: &Path,
    used: &mut BTreeSet<String>,
    contents: &mut Vec<Vec<u8>>,
) -> ZipappsResult<String> {
    let src = Path::new(file);
    if !src.is_file() {
        return Err(ZipappsError::IncludeNotFound(src.to_path_buf()));
    }
    let base = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "requirements.txt".to_string());

    let mut name = base.clone();
    let mut n = 1;
    while !used.insert(name.clone()) {
        name = format!("{}_{}", n, base);
        n += 1;
    }

    let dest = lazy_dir.join(&name);
    let content = fs::read(src)
        .map_err(|e| ZipappsError::io(format!("reading {}", src.display()), e))?;
    fs::write(&dest, &content).map_err(|e| {
        ZipappsError::io(format!("copying {} to {}", src.display(), dest.display()), e)
    })?;
    contents.push(content);
    debug!("Staged {} as {}", src.display(), dest.display());
    Ok(format!("{}/{}", layout::LAZY_PIP_DIR_NAME, name))
}
