//! Reading sealed archives: the embedded record, members and extraction

use crate::archive::layout;
use crate::config::BootstrapConfig;
use crate::error::{ZipappsError, ZipappsResult};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

/// An opened archive; a shebang prefix before the zip data is tolerated
pub struct ArchiveReader {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl ArchiveReader {
    /// Open the archive at `path`
    pub fn open(path: &Path) -> ZipappsResult<Self> {
        if !path.is_file() {
            return Err(ZipappsError::ArchiveNotFound(path.to_path_buf()));
        }
        let file = File::open(path)
            .map_err(|e| ZipappsError::io(format!("opening archive {}", path.display()), e))?;
        let archive = ZipArchive::new(file)?;

        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    /// Names of every member, in archive order
    pub fn member_names(&self) -> Vec<String> {
        self.archive.file_names().map(String::from).collect()
    }

    /// Whether a member with exactly this name exists
    pub fn has_member(&mut self, name: &str) -> bool {
        self.archive.by_name(name).is_ok()
    }

    /// Read the embedded bootstrap record
    pub fn bootstrap_config(&mut self) -> ZipappsResult<BootstrapConfig> {
        let mut entry = match self.archive.by_name(layout::BOOTSTRAP_RECORD_NAME) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(ZipappsError::BootstrapRecordMissing(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| ZipappsError::io("reading bootstrap record", e))?;
        Ok(serde_json::from_slice(&buf)?)
    }

    /// Extract every member accepted by `filter` below `dest`.
    ///
    /// Members whose names would escape `dest` are skipped. Returns the
    /// extracted file paths.
    pub fn extract_matching(
        &mut self,
        dest: &Path,
        filter: impl Fn(&str) -> bool,
    ) -> ZipappsResult<Vec<PathBuf>> {
        let mut extracted = Vec::new();

        for index in 0..self.archive.len() {
            let mut member = self.archive.by_index(index)?;
            if !filter(member.name()) {
                continue;
            }
            let rel = match member.enclosed_name() {
                Some(rel) => rel.to_path_buf(),
                None => {
                    warn!("Skipping unsafe archive member {}", member.name());
                    continue;
                }
            };
            let out = dest.join(rel);

            if member.is_dir() {
                fs::create_dir_all(&out).map_err(|e| {
                    ZipappsError::io(format!("creating directory {}", out.display()), e)
                })?;
                continue;
            }

            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    ZipappsError::io(format!("creating directory {}", parent.display()), e)
                })?;
            }
            let mut file = File::create(&out)
                .map_err(|e| ZipappsError::io(format!("creating {}", out.display()), e))?;
            io::copy(&mut member, &mut file)
                .map_err(|e| ZipappsError::io(format!("extracting {}", out.display()), e))?;

            #[cfg(unix)]
            if let Some(mode) = member.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o7777)).map_err(
                    |e| ZipappsError::io(format!("setting mode of {}", out.display()), e),
                )?;
            }

            extracted.push(out);
        }

        debug!(
            "Extracted {} file(s) from {} into {}",
            extracted.len(),
            self.path.display(),
            dest.display()
        );
        Ok(extracted)
    }
}

/// Whether an existing archive at `path` contains `member`.
/// A missing or unreadable archive simply does not.
pub fn archive_has_member(path: &Path, member: &str) -> bool {
    match ArchiveReader::open(path) {
        Ok(mut reader) => reader.has_member(member),
        Err(e) => {
            debug!("No usable archive at {}: {}", path.display(), e);
            false
        }
    }
}
