//! Git backend

use super::{lines, parse_commit_time, Context, Vcs};
use crate::error::{Result, UpstreamError};
use crate::hasher::{GitHasher, Hasher};
use crate::types::{FileHash, FileHashes};
use crate::utils;
use crate::version::preferred_tag;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Messages `git describe` prints when no tag is reachable
const NO_TAG_MESSAGES: &[&str] = &["No names found", "No tags can describe", "cannot describe"];

/// Tree entry modes for regular files
const REGULAR_FILE_MODES: &[&str] = &["100644", "100755"];

/// Drives the `git` command line
#[derive(Debug, Clone, Copy, Default)]
pub struct Git;

impl Vcs for Git {
    fn name(&self) -> &'static str {
        "git"
    }

    fn create(&self, ctx: &Context, repo: &str) -> Result<()> {
        debug!("Cloning {} into {}", repo, ctx.dir().display());
        ctx.sync(
            "git",
            [
                "clone".to_string(),
                "-q".to_string(),
                repo.to_string(),
                ctx.dir().to_string_lossy().into_owned(),
            ],
        )
    }

    fn tag_sync(&self, ctx: &Context, tag: &str) -> Result<()> {
        let tag_ref = format!("refs/tags/{}", tag);
        ctx.sync("git", ["checkout", "-q", "--detach", tag_ref.as_str()])
    }

    fn rev_sync(&self, ctx: &Context, rev: &str) -> Result<()> {
        ctx.sync("git", ["checkout", "-q", "--detach", rev])
    }

    fn tags(&self, ctx: &Context) -> Result<Vec<String>> {
        Ok(lines(&ctx.output("git", ["tag", "-l"])?))
    }

    fn revisions(&self, ctx: &Context) -> Result<Vec<String>> {
        Ok(lines(&ctx.output("git", ["rev-list", "--all", "--date-order"])?))
    }

    fn revision_from_tag(&self, ctx: &Context, tag: &str) -> Result<String> {
        let target = format!("refs/tags/{}^{{commit}}", tag);
        let (_, output) = ctx.run("git", ["rev-parse", "--verify", "-q", target.as_str()])?;
        let rev = output.stdout_str().trim().to_string();
        if !output.success() || rev.is_empty() {
            return Err(UpstreamError::not_found(format!("tag {}", tag)));
        }
        Ok(rev)
    }

    fn reachable_tag(&self, ctx: &Context, rev: &str) -> Result<String> {
        let (inv, output) = ctx.run("git", ["describe", "--tags", "--abbrev=0", rev])?;
        if !output.success() {
            let stderr = output.stderr_str();
            if NO_TAG_MESSAGES.iter().any(|msg| stderr.contains(msg)) {
                trace!("No tag reachable from {}", rev);
                return Err(UpstreamError::VersionNotFound);
            }
            return Err(output.command_error(&inv));
        }
        let described = output.stdout_str().trim().to_string();

        // Other tags on the same commit may be semver where this one is not
        let commit = format!("refs/tags/{}^{{commit}}", described);
        let siblings = lines(&ctx.output("git", ["tag", "--points-at", commit.as_str()])?);
        let candidates = siblings
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(described.as_str()));
        Ok(preferred_tag(candidates).unwrap_or(described))
    }

    fn time_from_revision(&self, ctx: &Context, rev: &str) -> Result<DateTime<Utc>> {
        let (inv, output) = ctx.run("git", ["show", "-s", "--format=%cI", rev])?;
        if !output.success() {
            let stderr = output.stderr_str();
            if stderr.contains("unknown revision") || stderr.contains("bad object") {
                return Err(UpstreamError::not_found(format!("revision {}", rev)));
            }
            return Err(output.command_error(&inv));
        }
        parse_commit_time(&output.stdout_str())
    }

    fn file_hashes_from_ref(&self, ctx: &Context, reference: &str, sub_path: &Path) -> Result<FileHashes> {
        let mut args = vec![
            "ls-tree".to_string(),
            "-r".to_string(),
            "-z".to_string(),
            "--full-tree".to_string(),
            reference.to_string(),
        ];
        let sub = utils::to_slash(sub_path);
        if !sub.is_empty() {
            args.push("--".to_string());
            args.push(sub);
        }

        let (inv, output) = ctx.run("git", args)?;
        if !output.success() {
            let stderr = output.stderr_str();
            if stderr.contains("Not a valid object name") || stderr.contains("not a tree object") {
                return Err(UpstreamError::not_found(format!("ref {}", reference)));
            }
            return Err(output.command_error(&inv));
        }

        parse_ls_tree(&output.stdout, sub_path)
    }

    fn hasher(&self, ctx: &Context) -> Box<dyn Hasher> {
        Box::new(GitHasher::new(ctx.runner().clone(), ctx.dir()))
    }
}

/// Parse `git ls-tree -r -z` output into hashes relative to `sub_path`
fn parse_ls_tree(stdout: &[u8], sub_path: &Path) -> Result<FileHashes> {
    let sub_path = utils::repo_relative(sub_path);
    let mut hashes = FileHashes::new();
    for record in stdout.split(|b| *b == 0).filter(|r| !r.is_empty()) {
        let record = String::from_utf8_lossy(record);
        let (meta, path) = record
            .split_once('\t')
            .ok_or_else(|| UpstreamError::internal(format!("malformed ls-tree entry {:?}", record)))?;

        let mut fields = meta.split_whitespace();
        let (Some(mode), Some(kind), Some(object)) = (fields.next(), fields.next(), fields.next()) else {
            return Err(UpstreamError::internal(format!("malformed ls-tree entry {:?}", record)));
        };
        if kind != "blob" || !REGULAR_FILE_MODES.contains(&mode) {
            continue;
        }

        let path = PathBuf::from(path);
        if let Ok(relative) = path.strip_prefix(&sub_path) {
            hashes.insert(FileHash::new(relative, object));
        }
    }
    Ok(hashes)
}
