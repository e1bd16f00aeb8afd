//! Disposable local checkouts of an upstream repository
//!
//! A [`WorkingTree`] owns one temporary directory holding a clone of one
//! repository, plus the backend and hashing strategy chosen for it. It is
//! the single object callers use to list version tags, derive
//! pseudo-versions, fingerprint files at a ref and diff vendored files.
//!
//! ## Lifecycle
//!
//! The checkout directory is created by [`WorkingTreeBuilder::build`] and
//! removed by [`WorkingTree::close`] or, failing that, when the tree is
//! dropped. If cloning fails the directory is removed before the error is
//! returned. Every operation after `close` fails with
//! [`UpstreamError::Closed`].
//!
//! ## Concurrency
//!
//! Queries take `&self` and may run from several threads (local files are
//! hashed in parallel). [`WorkingTree::tag_sync`] and
//! [`WorkingTree::rev_sync`] change the checkout and take `&mut self`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use upstream::{RepoRoot, WorkingTreeBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = RepoRoot::new("https://github.com/pkg/errors", "git");
//! let mut tree = WorkingTreeBuilder::new().build(&root)?;
//!
//! for tag in tree.version_tags()? {
//!     println!("{}", tag);
//! }
//! let head = tree.revisions()?.remove(0);
//! println!("HEAD is {}", tree.pseudo_version(&head)?);
//!
//! tree.close()?;
//! # Ok(())
//! # }
//! ```

use crate::diff;
use crate::error::{Result, UpstreamError};
use crate::hasher::Hasher;
use crate::normalize;
use crate::process::{CommandRunner, SystemRunner};
use crate::types::{FileHash, FileHashes, RepoRoot};
use crate::utils;
use crate::vcs::{self, Context, Vcs};
use crate::version::{self, Describable};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// Default prefix for checkout directories
pub const DEFAULT_TEMP_PREFIX: &str = "upstream.";

/// Builder for [`WorkingTree`]
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use upstream::WorkingTreeBuilder;
///
/// let builder = WorkingTreeBuilder::new()
///     .temp_prefix("audit.")
///     .command_timeout(Duration::from_secs(300));
/// ```
#[derive(Clone)]
pub struct WorkingTreeBuilder {
    runner: Option<Arc<dyn CommandRunner>>,
    temp_prefix: String,
    temp_root: Option<PathBuf>,
    command_timeout: Option<Duration>,
}

impl Default for WorkingTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingTreeBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self {
            runner: None,
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
            temp_root: None,
            command_timeout: None,
        }
    }

    /// Run backend and diff commands through `runner`
    ///
    /// Overrides [`WorkingTreeBuilder::command_timeout`].
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Name checkout directories with this prefix
    pub fn temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = prefix.into();
        self
    }

    /// Create checkout directories under `dir` instead of the system temp dir
    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    /// Kill external commands that run longer than `timeout`
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Clone `root` into a fresh checkout directory
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::UnknownBackend`] if `root.vcs` is not supported
    /// - [`UpstreamError::Checkout`] if the clone fails
    ///
    /// The checkout directory is removed on either failure.
    pub fn build(self, root: &RepoRoot) -> Result<WorkingTree> {
        let runner: Arc<dyn CommandRunner> = match self.runner {
            Some(runner) => runner,
            None => Arc::new(match self.command_timeout {
                Some(timeout) => SystemRunner::with_timeout(timeout),
                None => SystemRunner::new(),
            }),
        };

        let mut temp = tempfile::Builder::new();
        temp.prefix(&self.temp_prefix);
        let dir = match &self.temp_root {
            Some(parent) => temp.tempdir_in(parent),
            None => temp.tempdir(),
        }
        .map_err(|e| UpstreamError::io("create checkout directory", e))?;

        // From here on, returning early drops `dir` and removes it
        let backend = vcs::backend_for(&root.vcs)?;
        let ctx = Context::new(runner, dir.path());
        backend.create(&ctx, &root.repo)?;
        let hasher = backend.hasher(&ctx);

        info!("Checked out {} ({}) into {}", root.repo, backend.name(), dir.path().display());
        Ok(WorkingTree {
            dir: Some(dir),
            ctx,
            backend,
            hasher,
            root: root.clone(),
        })
    }
}

/// A local checkout plus the operations the backend supports on it
pub struct WorkingTree {
    dir: Option<TempDir>,
    ctx: Context,
    backend: Box<dyn Vcs>,
    hasher: Box<dyn Hasher>,
    root: RepoRoot,
}

impl std::fmt::Debug for WorkingTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingTree")
            .field("repo", &self.root.repo)
            .field("vcs", &self.backend.name())
            .field("dir", &self.dir.as_ref().map(|d| d.path()))
            .finish()
    }
}

impl WorkingTree {
    /// Clone `root` with default settings
    pub fn new(root: &RepoRoot) -> Result<Self> {
        WorkingTreeBuilder::new().build(root)
    }

    fn ensure_open(&self) -> Result<&Context> {
        if self.dir.is_some() {
            Ok(&self.ctx)
        } else {
            Err(UpstreamError::Closed)
        }
    }

    /// The repository this tree was cloned from
    pub fn root(&self) -> &RepoRoot {
        &self.root
    }

    /// Backend command name
    pub fn backend(&self) -> &'static str {
        self.backend.name()
    }

    /// Checkout directory
    pub fn dir(&self) -> Result<&Path> {
        Ok(self.ensure_open()?.dir())
    }

    /// Whether [`WorkingTree::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.dir.is_none()
    }

    /// Sync the checkout to `tag`
    pub fn tag_sync(&mut self, tag: &str) -> Result<()> {
        debug!("Syncing to tag {}", tag);
        self.backend.tag_sync(self.ensure_open()?, tag)
    }

    /// Sync the checkout to `rev`
    pub fn rev_sync(&mut self, rev: &str) -> Result<()> {
        debug!("Syncing to revision {}", rev);
        self.backend.rev_sync(self.ensure_open()?, rev)
    }

    /// Tags that parse as semantic versions, newest first
    pub fn version_tags(&self) -> Result<Vec<String>> {
        let tags = self.backend.tags(self.ensure_open()?)?;
        let versions = version::sort_version_tags(tags.iter().map(String::as_str));
        debug!("{} of {} tags are versions", versions.len(), tags.len());
        Ok(versions)
    }

    /// Every revision, newest first
    pub fn revisions(&self) -> Result<Vec<String>> {
        self.backend.revisions(self.ensure_open()?)
    }

    /// Revision `tag` points at
    pub fn revision_from_tag(&self, tag: &str) -> Result<String> {
        self.backend.revision_from_tag(self.ensure_open()?, tag)
    }

    /// Fingerprints of the files under `sub_path` at `reference`
    ///
    /// Paths in the result are relative to `sub_path`, which is itself
    /// relative to the repository root. `./sub` and `sub/` mean `sub`.
    pub fn file_hashes_from_ref(&self, reference: &str, sub_path: impl AsRef<Path>) -> Result<FileHashes> {
        let sub_path = utils::repo_relative(sub_path.as_ref());
        self.backend
            .file_hashes_from_ref(self.ensure_open()?, reference, &sub_path)
    }

    /// Pseudo-version of `rev`
    pub fn pseudo_version(&self, rev: &str) -> Result<String> {
        version::pseudo_version(self, rev)
    }

    /// Write the checkout file at `path` to `writer` without import comments
    ///
    /// Returns whether anything changed. Files with an extension that is not
    /// subject to stripping are left alone: `false`, nothing written.
    pub fn strip_import_comment(&self, path: impl AsRef<Path>, writer: &mut dyn Write) -> Result<bool> {
        let path = path.as_ref();
        if !normalize::is_strippable(path) {
            return Ok(false);
        }
        let full = self.ensure_open()?.dir().join(path);
        let file = File::open(&full)
            .map_err(|e| UpstreamError::io(format!("strip import comment {}", full.display()), e))?;
        normalize::strip_import_comment(BufReader::new(file), writer)
    }

    /// Write `diff -u` output comparing a checkout file with `local_file`
    ///
    /// A relative `path` is taken inside the checkout; `None` stands for a
    /// file missing upstream. Returns whether the files differ.
    pub fn diff(&self, out: &mut dyn Write, path: Option<&Path>, local_file: &Path) -> Result<bool> {
        let ctx = self.ensure_open()?;
        let upstream = path.map(|p| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                ctx.dir().join(p)
            }
        });
        diff::unified_diff(ctx.runner().as_ref(), out, upstream.as_deref(), local_file)
    }

    /// Remove the checkout directory
    ///
    /// Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close()
                .map_err(|e| UpstreamError::io(format!("remove {}", path.display()), e))?;
            info!("Removed checkout {}", path.display());
        }
        Ok(())
    }
}

impl Describable for WorkingTree {
    fn reachable_tag(&self, rev: &str) -> Result<String> {
        self.backend.reachable_tag(self.ensure_open()?, rev)
    }

    fn time_from_revision(&self, rev: &str) -> Result<DateTime<Utc>> {
        self.backend.time_from_revision(self.ensure_open()?, rev)
    }
}

impl Hasher for WorkingTree {
    fn hash(&self, relative_path: &Path, absolute_path: &Path) -> Result<FileHash> {
        self.ensure_open()?;
        self.hasher.hash(relative_path, absolute_path)
    }
}
