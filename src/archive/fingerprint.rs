//! Build fingerprints for build-skip
//!
//! A fingerprint is derived from the `build_id` option. When it names
//! existing files (comma separated paths, or a glob when it contains `*`)
//! their modification times are hashed, so a literal path list and an
//! equivalent glob agree. Otherwise the literal string is hashed.

use crate::archive::layout;
use crate::error::{ZipappsError, ZipappsResult};
use crate::paths::split_list;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;
use tracing::debug;

/// Digest of the declared build inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFingerprint {
    digest: String,
}

impl BuildFingerprint {
    /// Compute the fingerprint; `None` when no build id was given
    pub fn compute(build_id: &str) -> ZipappsResult<Option<Self>> {
        let build_id = build_id.trim();
        if build_id.is_empty() {
            return Ok(None);
        }

        let paths = candidate_paths(build_id)?;
        let mut mtimes: Vec<u128> = paths
            .iter()
            .filter_map(|p| p.metadata().ok())
            .filter_map(|m| m.modified().ok())
            .filter_map(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .collect();

        let mut hasher = Sha256::new();
        if mtimes.is_empty() {
            debug!("build id '{}' names no files, hashing literal", build_id);
            hasher.update(build_id.as_bytes());
        } else {
            mtimes.sort_unstable();
            debug!("build id '{}' resolved to {} file(s)", build_id, mtimes.len());
            for mtime in &mtimes {
                hasher.update(mtime.to_string().as_bytes());
                hasher.update(b",");
            }
        }

        Ok(Some(Self {
            digest: hex::encode(&hasher.finalize()[..8]),
        }))
    }

    /// Hex digest (16 chars)
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Archive member name that records this fingerprint
    pub fn marker_name(&self) -> String {
        layout::build_id_marker(&self.digest)
    }
}

fn candidate_paths(build_id: &str) -> ZipappsResult<Vec<PathBuf>> {
    if build_id.contains('*') {
        let entries = glob::glob(build_id).map_err(|e| ZipappsError::InvalidPattern {
            pattern: build_id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(entries.filter_map(Result::ok).collect())
    } else {
        Ok(split_list(build_id).into_iter().map(PathBuf::from).collect())
    }
}
