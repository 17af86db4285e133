//! The staging tree that becomes the archive's root

use crate::archive::{layout, writer::member_name};
use crate::error::{ZipappsError, ZipappsResult};
use crate::paths::split_list;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

const NATIVE_EXTENSIONS: [&str; 3] = ["so", "pyd", "dylib"];

/// Staging directory; a private one is deleted when this is dropped
#[derive(Debug)]
pub struct Staging {
    root: PathBuf,
    _temp: Option<TempDir>,
}

impl Staging {
    /// Use `cache_path` when given (created if missing), else a private temp dir
    pub fn prepare(cache_path: Option<&str>) -> ZipappsResult<Self> {
        match cache_path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => {
                let root = PathBuf::from(path);
                fs::create_dir_all(&root).map_err(|e| {
                    ZipappsError::io(format!("creating staging directory {}", root.display()), e)
                })?;
                Ok(Self { root, _temp: None })
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("zipapps-")
                    .tempdir()
                    .map_err(|e| ZipappsError::io("creating staging directory", e))?;
                Ok(Self {
                    root: temp.path().to_path_buf(),
                    _temp: Some(temp),
                })
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy each include verbatim into the root; directories recursively
    pub fn copy_includes(&self, includes: &[String]) -> ZipappsResult<()> {
        for include in includes {
            let src = Path::new(include);
            let name = match src.file_name() {
                Some(name) if src.exists() => name,
                _ => return Err(ZipappsError::IncludeNotFound(src.to_path_buf())),
            };
            let dest = self.root.join(name);

            if src.is_dir() {
                copy_tree(src, &dest)?;
            } else {
                fs::copy(src, &dest).map_err(|e| {
                    ZipappsError::io(format!("copying {}", src.display()), e)
                })?;
            }
            debug!("Included {}", src.display());
        }
        Ok(())
    }

    /// Delete everything matching the comma separated globs, relative to the root
    pub fn purge(&self, patterns: &str) -> ZipappsResult<usize> {
        let mut removed = 0;
        for pattern in split_list(patterns) {
            let full = self.root.join(&pattern);
            let full = full.to_string_lossy();
            let matches = glob::glob(&full).map_err(|e| ZipappsError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            for path in matches.filter_map(Result::ok) {
                let result = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                match result {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Could not purge {}: {}", path.display(), e),
                }
            }
        }
        debug!("Purged {} path(s) from staging", removed);
        Ok(removed)
    }

    /// Remove zipapps bookkeeping files left by an earlier build in a reused root
    pub fn clear_bookkeeping(&self) -> ZipappsResult<()> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| ZipappsError::io(format!("reading {}", self.root.display()), e))?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if layout::is_bookkeeping(&name.to_string_lossy()) && entry.path().is_file() {
                fs::remove_file(entry.path()).map_err(|e| {
                    ZipappsError::io(format!("removing {}", entry.path().display()), e)
                })?;
            }
        }
        Ok(())
    }

    /// Archive member names of native extension modules
    pub fn native_members(&self) -> Vec<String> {
        WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|x| x.to_str())
                    .is_some_and(|x| NATIVE_EXTENSIONS.contains(&x))
            })
            .filter_map(|e| e.path().strip_prefix(&self.root).ok().map(member_name))
            .collect()
    }

    /// Move the whole tree under `prefix/`
    pub fn relocate_under(&self, prefix: &str) -> ZipappsResult<()> {
        let holding = self.root.join(".zipapps_layer");
        fs::create_dir_all(&holding)
            .map_err(|e| ZipappsError::io(format!("creating {}", holding.display()), e))?;

        let entries = fs::read_dir(&self.root)
            .map_err(|e| ZipappsError::io(format!("reading {}", self.root.display()), e))?;
        for entry in entries.flatten() {
            if entry.path() == holding {
                continue;
            }
            let dest = holding.join(entry.file_name());
            fs::rename(entry.path(), &dest).map_err(|e| {
                ZipappsError::io(format!("moving {}", entry.path().display()), e)
            })?;
        }

        let target = self.root.join(prefix.trim_matches('/'));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ZipappsError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::rename(&holding, &target)
            .map_err(|e| ZipappsError::io(format!("moving tree to {}", target.display()), e))
    }
}

/// Top-level names without extension, as used by the unzip selection
pub fn top_level_names(members: &[String]) -> BTreeSet<String> {
    members
        .iter()
        .filter_map(|m| m.split('/').next())
        .map(|top| {
            Path::new(top)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| top.to_string())
        })
        .collect()
}

fn copy_tree(src: &Path, dest: &Path) -> ZipappsResult<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            ZipappsError::io(format!("walking {}", src.display()), std::io::Error::from(e))
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ZipappsError::User(e.to_string()))?;
        let out = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&out)
                .map_err(|e| ZipappsError::io(format!("creating {}", out.display()), e))?;
        } else {
            fs::copy(entry.path(), &out).map_err(|e| {
                ZipappsError::io(format!("copying {}", entry.path().display()), e)
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_staging_is_removed_on_drop() {
        let staging = Staging::prepare(None).unwrap();
        let root = staging.root().to_path_buf();
        assert!(root.is_dir());
        drop(staging);
        assert!(!root.exists());
    }

    #[test]
    fn given_staging_is_kept() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stage");
        let staging = Staging::prepare(Some(path.to_str().unwrap())).unwrap();
        drop(staging);
        assert!(path.is_dir());
    }

    #[test]
    fn includes_copy_files_and_trees() {
        let src = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("pkg/sub")).unwrap();
        fs::write(src.path().join("pkg/sub/mod.py"), "x").unwrap();
        fs::write(src.path().join("main.py"), "y").unwrap();
        let staging = Staging::prepare(None).unwrap();

        staging
            .copy_includes(&[
                src.path().join("pkg").display().to_string(),
                src.path().join("main.py").display().to_string(),
            ])
            .unwrap();

        assert!(staging.root().join("pkg/sub/mod.py").is_file());
        assert!(staging.root().join("main.py").is_file());

        let err = staging
            .copy_includes(&["/definitely/not/here.py".to_string()])
            .unwrap_err();
        assert!(matches!(err, ZipappsError::IncludeNotFound(_)));
    }

    #[test]
    fn purge_removes_matching_paths() {
        let staging = Staging::prepare(None).unwrap();
        let root = staging.root();
        fs::create_dir_all(root.join("six-1.16.0.dist-info")).unwrap();
        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::write(root.join("six.py"), "").unwrap();

        let removed = staging.purge("*.dist-info,__pycache__").unwrap();
        assert_eq!(removed, 2);
        assert!(root.join("six.py").is_file());
        assert!(!root.join("__pycache__").exists());
    }

    #[test]
    fn finds_native_members() {
        let staging = Staging::prepare(None).unwrap();
        let root = staging.root();
        fs::create_dir_all(root.join("lxml")).unwrap();
        fs::write(root.join("lxml/etree.so"), "").unwrap();
        fs::write(root.join("_speedups.pyd"), "").unwrap();
        fs::write(root.join("six.py"), "").unwrap();

        let mut natives = staging.native_members();
        natives.sort();
        assert_eq!(natives, vec!["_speedups.pyd", "lxml/etree.so"]);
        assert_eq!(
            top_level_names(&natives),
            BTreeSet::from(["_speedups".to_string(), "lxml".to_string()])
        );
    }

    #[test]
    fn relocate_moves_everything_under_prefix() {
        let staging = Staging::prepare(None).unwrap();
        let root = staging.root();
        fs::create_dir_all(root.join("python")).unwrap();
        fs::write(root.join("python/inner.py"), "").unwrap();
        fs::write(root.join("six.py"), "").unwrap();

        staging.relocate_under("python").unwrap();
        assert!(root.join("python/six.py").is_file());
        assert!(root.join("python/python/inner.py").is_file());
        assert!(!root.join("six.py").exists());
    }

    #[test]
    fn clears_stale_markers() {
        let staging = Staging::prepare(None).unwrap();
        fs::write(staging.root().join("_zip_time_1"), "").unwrap();
        fs::write(staging.root().join("keep.py"), "").unwrap();
        staging.clear_bookkeeping().unwrap();
        assert!(!staging.root().join("_zip_time_1").exists());
        assert!(staging.root().join("keep.py").exists());
    }
}
