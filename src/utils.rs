//! Utility functions for upstream
//!
//! File hashing and path helpers shared by the hashing strategies, the
//! backends and the reconciler.

use crate::error::{Result, UpstreamError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Hash a file's content efficiently using SHA-256
///
/// Reads the file in 8KB chunks so large files never sit in memory whole.
/// Returns the 64-character lowercase hex digest.
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| UpstreamError::io(format!("open {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192]; // 8KB buffer

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash arbitrary data using SHA-256
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first so symbolic links keep their own path,
/// falling back to canonicalizing both sides.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| UpstreamError::internal(format!(
            "Path {:?} is not relative to {:?}",
            path_canon, base_canon
        )))
}

/// Repository-relative form of `path` with `.` components and trailing
/// separators dropped, so `./sub/` and `sub` compare equal
pub fn repo_relative(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Render a relative path with `/` separators, as VCS tools expect
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether `path` lies inside a VCS metadata directory
pub fn is_vcs_metadata(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(c, Component::Normal(part) if part == ".git" || part == ".hg")
    })
}
