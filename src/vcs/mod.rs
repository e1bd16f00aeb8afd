//! Version-control backends
//!
//! A [`Vcs`] knows the command sequences for one version-control system:
//! how to clone, sync, list tags and revisions, and fingerprint files the
//! way that system does. The working tree picks one backend at construction
//! time from the repository descriptor and never inspects it again.
//!
//! Backends are stateless. Everything about a particular checkout (its
//! directory and the command runner) travels in a [`Context`].

mod git;
mod hg;

pub use git::Git;
pub use hg::Hg;

use crate::error::{Result, UpstreamError};
use crate::hasher::Hasher;
use crate::process::{CommandOutput, CommandRunner, Invocation};
use crate::types::FileHashes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command names of the supported backends
pub const SUPPORTED_BACKENDS: &[&str] = &["git", "hg"];

/// A checkout directory plus the means to run commands in it
#[derive(Clone)]
pub struct Context {
    runner: Arc<dyn CommandRunner>,
    dir: PathBuf,
}

impl Context {
    /// Bind `runner` to the checkout in `dir`
    pub fn new(runner: Arc<dyn CommandRunner>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            dir: dir.into(),
        }
    }

    /// Checkout directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shared command runner
    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// Run `program` inside the checkout, whatever its exit status
    pub fn run<I, S>(&self, program: &str, args: I) -> Result<(Invocation, CommandOutput)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inv = Invocation::new(program, args).in_dir(&self.dir);
        let output = self.runner.run(&inv)?;
        Ok((inv, output))
    }

    /// Run `program` inside the checkout and return its stdout on success
    pub fn output<I, S>(&self, program: &str, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (inv, output) = self.run(program, args)?;
        Ok(output.into_success(&inv)?.stdout_str())
    }

    /// Run a command that changes the checkout; failure is a checkout error
    pub fn sync<I, S>(&self, program: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (inv, output) = self.run(program, args)?;
        if output.success() {
            Ok(())
        } else {
            Err(UpstreamError::checkout(format!(
                "{} {}: {}",
                inv.program,
                inv.display_args(),
                output.stderr_str()
            )))
        }
    }
}

/// Command sequences for one version-control system
pub trait Vcs: Send + Sync {
    /// Backend command name
    fn name(&self) -> &'static str;

    /// Clone `repo` into the (empty) checkout directory
    fn create(&self, ctx: &Context, repo: &str) -> Result<()>;

    /// Update the working directory to `tag`
    fn tag_sync(&self, ctx: &Context, tag: &str) -> Result<()>;

    /// Update the working directory to `rev`
    fn rev_sync(&self, ctx: &Context, rev: &str) -> Result<()>;

    /// Every tag, in the backend's listing order
    fn tags(&self, ctx: &Context) -> Result<Vec<String>>;

    /// Every revision, newest first
    fn revisions(&self, ctx: &Context) -> Result<Vec<String>>;

    /// Revision a tag points at
    fn revision_from_tag(&self, ctx: &Context, tag: &str) -> Result<String>;

    /// Most recent tag reachable from `rev`, preferring semver tags
    fn reachable_tag(&self, ctx: &Context, rev: &str) -> Result<String>;

    /// Commit timestamp of `rev`
    fn time_from_revision(&self, ctx: &Context, rev: &str) -> Result<DateTime<Utc>>;

    /// Fingerprints of every regular file under `sub_path` at `reference`
    fn file_hashes_from_ref(&self, ctx: &Context, reference: &str, sub_path: &Path) -> Result<FileHashes>;

    /// Hashing strategy whose digests match [`Vcs::file_hashes_from_ref`]
    fn hasher(&self, ctx: &Context) -> Box<dyn Hasher>;
}

/// Backend for the command name in a repository descriptor
pub fn backend_for(kind: &str) -> Result<Box<dyn Vcs>> {
    match kind {
        "git" => Ok(Box::new(Git)),
        "hg" => Ok(Box::new(Hg)),
        other => Err(UpstreamError::UnknownBackend(other.to_string())),
    }
}

/// Non-empty trimmed lines of command output
pub(crate) fn lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an RFC 3339 commit time into UTC
pub(crate) fn parse_commit_time(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| UpstreamError::InvalidTimestamp(text.to_string()))
}
