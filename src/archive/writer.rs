//! Sealing a staging directory into an archive

use crate::error::{ZipappsError, ZipappsResult};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::CompressionMethod;

/// Summary of a sealed archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealStats {
    pub files: usize,
    pub dirs: usize,
}

/// Seal every file and directory under `staging` into `output`.
///
/// When `interpreter` is set the archive starts with `#!<interpreter>` and is
/// marked executable. The archive is written to a temp file next to `output`
/// and moved into place once complete.
pub fn seal(
    staging: &Path,
    output: &Path,
    interpreter: Option<&str>,
    compressed: bool,
) -> ZipappsResult<SealStats> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir()
            .map_err(|e| ZipappsError::io("getting current directory", e))?,
    };
    std::fs::create_dir_all(&parent)
        .map_err(|e| ZipappsError::io(format!("creating directory {}", parent.display()), e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| {
        ZipappsError::io(format!("creating temp archive in {}", parent.display()), e)
    })?;

    if let Some(interpreter) = interpreter {
        writeln!(tmp, "#!{}", interpreter)
            .map_err(|e| ZipappsError::io("writing shebang", e))?;
    }

    let method = if compressed {
        CompressionMethod::Deflated
    } else {
        CompressionMethod::Stored
    };
    let stats = write_tree(staging, tmp.as_file_mut(), method)?;

    set_archive_mode(tmp.path(), interpreter.is_some())?;

    tmp.persist(output)
        .map_err(|e| ZipappsError::io(format!("writing archive {}", output.display()), e.error))?;

    debug!(
        "Sealed {} files and {} dirs into {}",
        stats.files,
        stats.dirs,
        output.display()
    );
    Ok(stats)
}

fn write_tree(
    staging: &Path,
    file: &mut File,
    method: CompressionMethod,
) -> ZipappsResult<SealStats> {
    let mut zip = zip::ZipWriter::new(file);
    let mut stats = SealStats { files: 0, dirs: 0 };

    for entry in WalkDir::new(staging).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let context = format!("walking {}", staging.display());
            ZipappsError::io(context, io::Error::from(e))
        })?;
        let rel = entry
            .path()
            .strip_prefix(staging)
            .map_err(|e| ZipappsError::User(e.to_string()))?;
        let name = member_name(rel);
        let options = FileOptions::default()
            .compression_method(method)
            .unix_permissions(unix_mode(entry.path()));

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)?;
            stats.dirs += 1;
        } else {
            zip.start_file(name, options)?;
            let mut src = File::open(entry.path())
                .map_err(|e| ZipappsError::io(format!("reading {}", entry.path().display()), e))?;
            io::copy(&mut src, &mut zip)
                .map_err(|e| ZipappsError::io(format!("archiving {}", entry.path().display()), e))?;
            stats.files += 1;
        }
    }

    zip.finish()?;
    Ok(stats)
}

/// Archive member name: relative path with `/` separators
pub fn member_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn unix_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn unix_mode(path: &Path) -> u32 {
    if path.is_dir() {
        0o755
    } else {
        0o644
    }
}

// Temp files are created 0600; archives are meant to be shared.
#[cfg(unix)]
fn set_archive_mode(path: &Path, executable: bool) -> ZipappsResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if executable { 0o755 } else { 0o644 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| ZipappsError::io(format!("setting mode of {}", path.display()), e))
}

#[cfg(not(unix))]
fn set_archive_mode(_path: &Path, _executable: bool) -> ZipappsResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    fn staging_with_package() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/__init__.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("main.py"), "print(1)\n").unwrap();
        dir
    }

    #[test]
    fn seals_tree_with_directories() {
        let staging = staging_with_package();
        let out = TempDir::new().unwrap();
        let output = out.path().join("app.pyz");

        let stats = seal(staging.path(), &output, None, false).unwrap();
        assert_eq!(stats, SealStats { files: 2, dirs: 1 });

        let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["main.py", "pkg/", "pkg/__init__.py"]);

        let mut content = String::new();
        archive
            .by_name("pkg/__init__.py")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "x = 1\n");
    }

    #[test]
    fn shebang_prefix_keeps_archive_readable() {
        let staging = staging_with_package();
        let out = TempDir::new().unwrap();
        let output = out.path().join("app.pyz");

        seal(staging.path(), &output, Some("/usr/bin/env zipapps run"), true).unwrap();

        let bytes = fs::read(&output).unwrap();
        assert!(bytes.starts_with(b"#!/usr/bin/env zipapps run\n"));
        let archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&output).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn compression_shrinks_repetitive_content() {
        let staging = TempDir::new().unwrap();
        fs::write(staging.path().join("big.txt"), "a".repeat(64 * 1024)).unwrap();
        let out = TempDir::new().unwrap();

        let stored = out.path().join("stored.pyz");
        let deflated = out.path().join("deflated.pyz");
        seal(staging.path(), &stored, None, false).unwrap();
        seal(staging.path(), &deflated, None, true).unwrap();

        let stored_len = fs::metadata(&stored).unwrap().len();
        let deflated_len = fs::metadata(&deflated).unwrap().len();
        assert!(deflated_len < stored_len);
    }

    #[test]
    fn member_names_use_forward_slashes() {
        let rel = Path::new("a").join("b").join("c.py");
        assert_eq!(member_name(&rel), "a/b/c.py");
    }
}
