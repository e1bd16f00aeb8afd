//! Content fingerprints for comparing vendored files with a checkout
//!
//! A [`Hasher`] turns a file on disk, together with the repository path it
//! would have, into a [`FileHash`]. The path matters for backends whose
//! digest depends on repository attributes (git applies per-path filters
//! before hashing a blob).
//!
//! ## Strategies
//!
//! - [`GitHasher`]: git blob ids, computed by `git hash-object` inside the
//!   checkout so the result is directly comparable with `git ls-tree`
//! - [`Sha256Hasher`]: plain SHA-256 of the file content; the path is ignored
//!
//! Digests from different strategies are never comparable with each other.
//! Two collections built by the same strategy compare equal exactly when
//! their content does.

use crate::error::{Result, UpstreamError};
use crate::process::{CommandRunner, Invocation};
use crate::types::{FileHash, FileHashes};
use crate::utils;
use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Strategy for fingerprinting a single file
pub trait Hasher: Send + Sync {
    /// Hash the file at `absolute_path` as though it were stored in the
    /// repository at `relative_path`
    fn hash(&self, relative_path: &Path, absolute_path: &Path) -> Result<FileHash>;
}

/// SHA-256 of the raw file content
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, relative_path: &Path, absolute_path: &Path) -> Result<FileHash> {
        let digest = utils::hash_file_content(absolute_path)?;
        Ok(FileHash::new(relative_path, digest))
    }
}

/// Git blob ids via `git hash-object --path`
pub struct GitHasher {
    runner: Arc<dyn CommandRunner>,
    dir: PathBuf,
}

impl GitHasher {
    /// Hash using the git checkout in `dir`
    pub fn new(runner: Arc<dyn CommandRunner>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            dir: dir.into(),
        }
    }
}

impl Hasher for GitHasher {
    fn hash(&self, relative_path: &Path, absolute_path: &Path) -> Result<FileHash> {
        let inv = Invocation::new(
            "git",
            [
                "hash-object".to_string(),
                "--path".to_string(),
                utils::to_slash(relative_path),
                absolute_path.to_string_lossy().into_owned(),
            ],
        )
        .in_dir(&self.dir);
        let output = self.runner.run(&inv)?.into_success(&inv)?;
        let digest = output.stdout_str().trim().to_string();
        if digest.is_empty() {
            return Err(UpstreamError::internal(format!(
                "git hash-object printed nothing for {}",
                absolute_path.display()
            )));
        }
        trace!("{} -> {}", relative_path.display(), digest);
        Ok(FileHash::new(relative_path, digest))
    }
}

/// Compile exclude globs, matched against paths relative to the tree root
pub fn build_excludes(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| UpstreamError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| UpstreamError::InvalidPattern(e.to_string()))
}

/// Regular files under `dir`, relative to it, in path order
///
/// VCS metadata directories and anything matching `excludes` are skipped.
/// Symbolic links are not followed and not listed.
pub fn list_files(dir: &Path, excludes: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir).sort_by_file_name().into_iter().filter_entry(|entry| {
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        relative.as_os_str().is_empty()
            || !(utils::is_vcs_metadata(relative) || excludes.is_match(relative))
    });

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(utils::make_relative(entry.path(), dir)?);
        }
    }
    files.sort();
    Ok(files)
}

/// Hash every regular file under `dir` with `hasher`
///
/// Files are hashed in parallel; the result is ordered by path regardless.
pub fn hash_tree(hasher: &dyn Hasher, dir: &Path, excludes: &GlobSet) -> Result<FileHashes> {
    let files = list_files(dir, excludes)?;
    debug!("Hashing {} files under {}", files.len(), dir.display());

    let hashes = files
        .par_iter()
        .map(|relative| hasher.hash(relative, &dir.join(relative)))
        .collect::<Result<Vec<_>>>()?;

    Ok(hashes.into_iter().collect())
}
