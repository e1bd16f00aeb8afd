//! Matching a vendored copy against upstream history
//!
//! Given a checkout of the upstream repository and a local directory that
//! was vendored from it, [`Reconciler::describe`] finds the newest version
//! tag, or failing that the newest revision, whose files the local copy
//! reproduces exactly.
//!
//! ## Matching rule
//!
//! A ref matches when every local file exists at that ref under the
//! sub-path with an identical fingerprint. Upstream files missing locally
//! are ignored; vendoring commonly drops tests and examples.
//!
//! When the only differing files are Go sources, each upstream version is
//! re-hashed with its import comment stripped before giving up on the ref,
//! so copies made by tools that removed those comments still match.
//!
//! ## Search order
//!
//! 1. Version tags, newest first
//! 2. Revisions, newest first (optional, bounded by `max_revisions`)
//!
//! A tag match reports the tag as the version; a revision match reports a
//! pseudo-version.

use crate::error::{Result, UpstreamError};
use crate::hasher::{build_excludes, list_files, Hasher};
use crate::normalize;
use crate::types::{FileHash, FileHashes, Reference};
use crate::utils;
use crate::working_tree::WorkingTree;
use globset::GlobSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

/// Options controlling how a vendored copy is matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Glob patterns for local files to leave out of the comparison
    pub excludes: Vec<String>,
    /// Retry mismatching Go files with import comments stripped
    pub strip_import_comments: bool,
    /// Fall back to scanning revisions when no tag matches
    pub search_revisions: bool,
    /// Upper bound on revisions scanned, newest first
    pub max_revisions: Option<usize>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            excludes: Vec::new(),
            strip_import_comments: true,
            search_revisions: true,
            max_revisions: None,
        }
    }
}

/// A tag or revision being tried
#[derive(Debug, Clone, Copy)]
enum Candidate<'a> {
    Tag(&'a str),
    Rev(&'a str),
}

impl<'a> Candidate<'a> {
    fn name(&self) -> &'a str {
        match *self {
            Candidate::Tag(name) | Candidate::Rev(name) => name,
        }
    }

    fn sync(&self, tree: &mut WorkingTree) -> Result<()> {
        match self {
            Candidate::Tag(tag) => tree.tag_sync(tag),
            Candidate::Rev(rev) => tree.rev_sync(rev),
        }
    }
}

/// Finds the upstream ref a vendored directory came from
#[derive(Debug, Clone)]
pub struct Reconciler {
    options: ReconcileOptions,
    excludes: GlobSet,
}

impl Reconciler {
    /// Compile `options` into a reconciler
    ///
    /// Fails with [`UpstreamError::InvalidPattern`] on a bad exclude glob.
    pub fn new(options: ReconcileOptions) -> Result<Self> {
        let excludes = build_excludes(&options.excludes)?;
        Ok(Self { options, excludes })
    }

    /// Options in effect
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Fingerprint the local files as though they lived at `sub_path`
    pub fn local_hashes(&self, tree: &WorkingTree, local_dir: &Path, sub_path: &Path) -> Result<FileHashes> {
        let sub_path = utils::repo_relative(sub_path);
        let files = list_files(local_dir, &self.excludes)?;
        let hashes = files
            .par_iter()
            .map(|rel| {
                let hash = tree.hash(&sub_path.join(rel), &local_dir.join(rel))?;
                Ok(FileHash::new(rel, hash.digest))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(hashes.into_iter().collect())
    }

    /// Find the newest tag or revision the local copy reproduces
    ///
    /// # Errors
    ///
    /// [`UpstreamError::NoMatch`] if nothing matches; backend and I/O
    /// errors propagate.
    pub fn describe(&self, tree: &mut WorkingTree, local_dir: &Path, sub_path: &Path) -> Result<Reference> {
        self.describe_with_progress(tree, local_dir, sub_path, &mut |_| {})
    }

    /// [`Reconciler::describe`], reporting each candidate before it is tried
    pub fn describe_with_progress(
        &self,
        tree: &mut WorkingTree,
        local_dir: &Path,
        sub_path: &Path,
        progress: &mut dyn FnMut(&str),
    ) -> Result<Reference> {
        let sub_path = &utils::repo_relative(sub_path);
        let local = self.local_hashes(tree, local_dir, sub_path)?;
        if local.is_empty() {
            warn!("No files to compare under {}", local_dir.display());
            return Err(UpstreamError::NoMatch(local_dir.to_path_buf()));
        }
        info!("Matching {} local files against {}", local.len(), tree.root().repo);

        for tag in tree.version_tags()? {
            progress(&tag);
            if self.matches(tree, Candidate::Tag(&tag), sub_path, &local)? {
                let rev = tree.revision_from_tag(&tag)?;
                info!("Matched tag {} ({})", tag, rev);
                return Ok(Reference {
                    tag: Some(tag.clone()),
                    rev,
                    version: tag,
                });
            }
        }

        if self.options.search_revisions {
            let revisions = tree.revisions()?;
            let limit = self.options.max_revisions.unwrap_or(revisions.len());
            for rev in revisions.into_iter().take(limit) {
                progress(&rev);
                if self.matches(tree, Candidate::Rev(&rev), sub_path, &local)? {
                    let version = tree.pseudo_version(&rev)?;
                    info!("Matched revision {} as {}", rev, version);
                    return Ok(Reference {
                        tag: None,
                        rev,
                        version,
                    });
                }
            }
        }

        Err(UpstreamError::NoMatch(local_dir.to_path_buf()))
    }

    fn matches(
        &self,
        tree: &mut WorkingTree,
        candidate: Candidate<'_>,
        sub_path: &Path,
        local: &FileHashes,
    ) -> Result<bool> {
        let upstream = tree.file_hashes_from_ref(candidate.name(), sub_path)?;
        let mismatches = upstream.mismatches(local);
        if mismatches.is_empty() {
            return Ok(true);
        }
        trace!("{}: {} files differ", candidate.name(), mismatches.len());

        if !self.options.strip_import_comments
            || mismatches
                .iter()
                .any(|p| !normalize::is_strippable(p) || upstream.get(p).is_none())
        {
            return Ok(false);
        }

        candidate.sync(tree)?;
        for path in &mismatches {
            let repo_path = sub_path.join(path);
            let mut scratch = NamedTempFile::new()?;
            if !tree.strip_import_comment(&repo_path, &mut scratch)? {
                return Ok(false);
            }
            scratch.flush()?;

            let stripped = tree.hash(&repo_path, scratch.path())?;
            if local.get(path) != Some(stripped.digest.as_str()) {
                return Ok(false);
            }
            debug!("{} matches once its import comment is stripped", path.display());
        }
        Ok(true)
    }

    /// Write `diff -u` output for every local file that differs from `reference`
    ///
    /// Local files without an upstream counterpart are diffed against an
    /// empty file. Returns whether any file differed.
    pub fn write_diff(
        &self,
        tree: &mut WorkingTree,
        reference: &Reference,
        local_dir: &Path,
        sub_path: &Path,
        out: &mut dyn Write,
    ) -> Result<bool> {
        let sub_path = &utils::repo_relative(sub_path);
        tree.rev_sync(&reference.rev)?;
        let mut changed = false;

        for rel in list_files(local_dir, &self.excludes)? {
            let upstream = tree.dir()?.join(sub_path).join(&rel);
            let local = local_dir.join(&rel);

            if !upstream.is_file() {
                changed |= tree.diff(out, None, &local)?;
                continue;
            }

            // Compare against the stripped upstream so import comments don't show
            let mut scratch = NamedTempFile::new()?;
            let stripped = self.options.strip_import_comments
                && tree.strip_import_comment(sub_path.join(&rel), &mut scratch)?;
            let upstream_side: PathBuf = if stripped {
                scratch.flush()?;
                scratch.path().to_path_buf()
            } else {
                upstream
            };
            changed |= tree.diff(out, Some(&upstream_side), &local)?;
        }

        Ok(changed)
    }
}
