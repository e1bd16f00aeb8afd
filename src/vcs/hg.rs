//! Mercurial backend
//!
//! Mercurial has no content hash comparable to a git blob id, so files are
//! fingerprinted with SHA-256. Content at a ref is exported with `hg cat`
//! into a scratch directory, leaving the working directory untouched.

use super::{lines, parse_commit_time, Context, Vcs};
use crate::error::{Result, UpstreamError};
use crate::hasher::{hash_tree, Hasher, Sha256Hasher};
use crate::types::FileHashes;
use crate::utils;
use crate::version::preferred_tag;
use chrono::{DateTime, Utc};
use globset::GlobSet;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, trace};

/// Pseudo-tag Mercurial always reports for the newest changeset
const TIP: &str = "tip";

/// `{latesttag}` value when no tag is reachable
const NO_TAG: &str = "null";

/// Drives the `hg` command line
#[derive(Debug, Clone, Copy, Default)]
pub struct Hg;

impl Hg {
    fn unknown_revision(stderr: &str) -> bool {
        stderr.contains("unknown revision") || stderr.contains("not found in manifest")
    }

    fn log(&self, ctx: &Context, rev: &str, template: &str) -> Result<String> {
        let (inv, output) = ctx.run("hg", ["log", "-r", rev, "-T", template])?;
        if !output.success() {
            if Self::unknown_revision(&output.stderr_str()) {
                return Err(UpstreamError::not_found(format!("revision {}", rev)));
            }
            return Err(output.command_error(&inv));
        }
        Ok(output.stdout_str().trim().to_string())
    }
}

impl Vcs for Hg {
    fn name(&self) -> &'static str {
        "hg"
    }

    fn create(&self, ctx: &Context, repo: &str) -> Result<()> {
        debug!("Cloning {} into {}", repo, ctx.dir().display());
        ctx.sync(
            "hg",
            [
                "clone".to_string(),
                "-q".to_string(),
                repo.to_string(),
                ctx.dir().to_string_lossy().into_owned(),
            ],
        )
    }

    fn tag_sync(&self, ctx: &Context, tag: &str) -> Result<()> {
        ctx.sync("hg", ["update", "-q", "-r", tag])
    }

    fn rev_sync(&self, ctx: &Context, rev: &str) -> Result<()> {
        ctx.sync("hg", ["update", "-q", "-r", rev])
    }

    fn tags(&self, ctx: &Context) -> Result<Vec<String>> {
        let tags = lines(&ctx.output("hg", ["tags", "-q"])?);
        Ok(tags.into_iter().filter(|t| t != TIP).collect())
    }

    fn revisions(&self, ctx: &Context) -> Result<Vec<String>> {
        Ok(lines(&ctx.output("hg", ["log", "-T", "{node}\\n"])?))
    }

    fn revision_from_tag(&self, ctx: &Context, tag: &str) -> Result<String> {
        match self.log(ctx, tag, "{node}") {
            Ok(rev) if !rev.is_empty() => Ok(rev),
            Ok(_) | Err(UpstreamError::NotFound(_)) => Err(UpstreamError::not_found(format!("tag {}", tag))),
            Err(e) => Err(e),
        }
    }

    fn reachable_tag(&self, ctx: &Context, rev: &str) -> Result<String> {
        let latest = self.log(ctx, rev, "{latesttag}")?;
        // Several tags on the nearest tagged changeset come back colon-separated
        let tags: Vec<&str> = latest
            .split(':')
            .filter(|t| !t.is_empty() && *t != NO_TAG)
            .collect();
        match preferred_tag(tags) {
            Some(tag) => Ok(tag),
            None => {
                trace!("No tag reachable from {}", rev);
                Err(UpstreamError::VersionNotFound)
            }
        }
    }

    fn time_from_revision(&self, ctx: &Context, rev: &str) -> Result<DateTime<Utc>> {
        parse_commit_time(&self.log(ctx, rev, "{date|rfc3339date}")?)
    }

    fn file_hashes_from_ref(&self, ctx: &Context, reference: &str, sub_path: &Path) -> Result<FileHashes> {
        let scratch = TempDir::with_prefix("upstream-hg.")?;
        let sub = utils::to_slash(sub_path);
        let pattern = if sub.is_empty() {
            "glob:**".to_string()
        } else {
            format!("path:{}", sub)
        };
        let output_pattern = format!("{}/%p", scratch.path().to_string_lossy());

        let (inv, output) = ctx.run(
            "hg",
            ["cat", "-r", reference, "-o", output_pattern.as_str(), pattern.as_str()],
        )?;
        match output.status {
            Some(0) => {}
            // No files matched the pattern
            Some(1) if !Self::unknown_revision(&output.stderr_str()) => return Ok(FileHashes::new()),
            _ if Self::unknown_revision(&output.stderr_str()) => {
                return Err(UpstreamError::not_found(format!("ref {}", reference)));
            }
            _ => return Err(output.command_error(&inv)),
        }

        let root = scratch.path().join(sub_path);
        if !root.is_dir() {
            return Ok(FileHashes::new());
        }
        hash_tree(&Sha256Hasher, &root, &GlobSet::empty())
    }

    fn hasher(&self, _ctx: &Context) -> Box<dyn Hasher> {
        Box::new(Sha256Hasher)
    }
}
