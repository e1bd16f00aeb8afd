//! Core data types used throughout the upstream library
//!
//! ## Overview
//!
//! - **Repository identity**: [`RepoRoot`] names an upstream repository and
//!   the version-control system that serves it
//! - **Content fingerprints**: [`FileHash`] and [`FileHashes`] record what
//!   each file in a subtree hashes to
//! - **Results**: [`Reference`] says which tag or revision a vendored copy
//!   corresponds to
//!
//! ## Examples
//!
//! ```rust
//! use upstream::types::{FileHash, FileHashes};
//!
//! let upstream = FileHashes::from_iter(vec![
//!     FileHash::new("a.go", "01"),
//!     FileHash::new("b.go", "02"),
//! ]);
//! let vendored = FileHashes::from_iter(vec![FileHash::new("a.go", "01")]);
//!
//! assert!(vendored.is_subset_of(&upstream));
//! assert!(upstream.mismatches(&vendored).is_empty());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An upstream repository and the backend that serves it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRoot {
    /// Clone URL or local path of the repository
    pub repo: String,
    /// Backend command name, e.g. `git` or `hg`
    pub vcs: String,
}

impl RepoRoot {
    /// Describe the repository at `repo` served by `vcs`
    pub fn new(repo: impl Into<String>, vcs: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            vcs: vcs.into(),
        }
    }
}

/// Content fingerprint of one file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileHash {
    /// Path relative to the compared subtree
    pub path: PathBuf,
    /// Lowercase hex digest; the algorithm depends on the backend
    pub digest: String,
}

impl FileHash {
    /// Pair a path with its digest
    pub fn new(path: impl Into<PathBuf>, digest: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            digest: digest.into(),
        }
    }
}

/// Fingerprints of every regular file in a subtree, ordered by path
///
/// Two collections built with the same [`Hasher`](crate::hasher::Hasher)
/// compare equal exactly when the subtrees hold the same files with the
/// same content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHashes {
    entries: BTreeMap<PathBuf, String>,
}

impl FileHashes {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the digest for a path
    pub fn insert(&mut self, hash: FileHash) {
        self.entries.insert(hash.path, hash.digest);
    }

    /// Digest recorded for `path`
    pub fn get(&self, path: &Path) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection holds no files
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.entries
            .iter()
            .map(|(path, digest)| (path.as_path(), digest.as_str()))
    }

    /// Paths in order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Paths in `local` that are missing here or carry a different digest
    ///
    /// `self` is the upstream side. Files present upstream but absent from
    /// `local` are not mismatches; vendored copies routinely omit files.
    pub fn mismatches(&self, local: &FileHashes) -> Vec<PathBuf> {
        local
            .entries
            .iter()
            .filter(|(path, digest)| self.entries.get(*path) != Some(*digest))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Whether every entry here appears with the same digest in `other`
    pub fn is_subset_of(&self, other: &FileHashes) -> bool {
        other.mismatches(self).is_empty()
    }
}

impl FromIterator<FileHash> for FileHashes {
    fn from_iter<I: IntoIterator<Item = FileHash>>(iter: I) -> Self {
        let mut hashes = FileHashes::new();
        for hash in iter {
            hashes.insert(hash);
        }
        hashes
    }
}

impl Extend<FileHash> for FileHashes {
    fn extend<I: IntoIterator<Item = FileHash>>(&mut self, iter: I) {
        for hash in iter {
            self.insert(hash);
        }
    }
}

/// The upstream point a vendored copy was found to match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Matching version tag, when the match came from a tag
    pub tag: Option<String>,
    /// Revision identifier
    pub rev: String,
    /// The tag itself, or a pseudo-version for untagged revisions
    pub version: String,
}

impl Reference {
    /// Short revision for display
    pub fn short_rev(&self) -> &str {
        let end = self.rev.char_indices().nth(12).map_or(self.rev.len(), |(i, _)| i);
        &self.rev[..end]
    }
}
