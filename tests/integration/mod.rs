//! Integration tests against real git repositories
//!
//! Each test builds a small repository with fixed commit dates in a
//! temporary directory and drives it through the public API. Tests return
//! early when `git` (or `diff`, for diff tests) is not installed.

use ::upstream::*;
use anyhow::Context as _;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;
use tracing::info;

/// A scratch git repository with deterministic commits
pub struct GitFixture {
    pub dir: TempDir,
}

impl GitFixture {
    /// Initialize an empty repository
    pub fn new() -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let fixture = Self { dir };
        fixture.git(&["init", "-q"], None)?;
        Ok(fixture)
    }

    /// Run git in the repository, committing as a fixed identity
    pub fn git(&self, args: &[&str], date: Option<&str>) -> anyhow::Result<String> {
        let mut cmd = Command::new("git");
        cmd.args([
            "-c",
            "user.name=Upstream Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
        ])
        .args(args)
        .current_dir(self.dir.path());
        if let Some(date) = date {
            cmd.env("GIT_AUTHOR_DATE", date).env("GIT_COMMITTER_DATE", date);
        }

        let output = cmd.output().context("running git")?;
        anyhow::ensure!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    /// Write a file relative to the repository root
    pub fn write(&self, rel: &str, content: &str) -> anyhow::Result<()> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Commit everything at `date` (`YYYY-MM-DD hh:mm:ss +zzzz`) and return the revision
    pub fn commit(&self, message: &str, date: &str) -> anyhow::Result<String> {
        self.git(&["add", "-A"], None)?;
        self.git(&["commit", "-q", "-m", message], Some(date))?;
        self.git(&["rev-parse", "HEAD"], None)
    }

    /// Lightweight tag on HEAD
    pub fn tag(&self, name: &str) -> anyhow::Result<()> {
        self.git(&["tag", name], None)?;
        Ok(())
    }

    pub fn root(&self) -> RepoRoot {
        RepoRoot::new(self.dir.path().to_string_lossy(), "git")
    }

    pub fn checkout(&self) -> Result<WorkingTree> {
        WorkingTree::new(&self.root())
    }
}

/// Whether `program --version` runs
pub fn tool_available(program: &str) -> bool {
    let found = Command::new(program)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !found {
        info!("{} not installed, skipping", program);
    }
    found
}

/// Copy `files` into a fresh vendored directory
pub fn vendor(files: &[(&str, &str)]) -> anyhow::Result<TempDir> {
    let dir = TempDir::new()?;
    for (rel, content) in files {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
    }
    Ok(dir)
}

const DOC_V1: &str = "// Package errors provides error handling.\npackage errors // import \"github.com/pkg/errors\"\n";
const DOC_V1_STRIPPED: &str = "// Package errors provides error handling.\npackage errors\n";
const ERRORS_V1: &str = "package errors\n\nfunc New(msg string) error { return nil }\n";
const ERRORS_V2: &str = "package errors\n\nfunc New(msg string) error { return &fundamental{msg} }\n";

/// Two commits: v1.2.3 at 2018-01-02, then an untagged fix a month later
fn two_commit_history() -> anyhow::Result<(GitFixture, String, String)> {
    let repo = GitFixture::new()?;
    repo.write("README.md", "# errors\n")?;
    repo.write("errors/doc.go", DOC_V1)?;
    repo.write("errors/errors.go", ERRORS_V1)?;
    let first = repo.commit("Initial", "2018-01-02 15:04:05 +0000")?;
    repo.tag("v1.2.3")?;

    repo.write("errors/errors.go", ERRORS_V2)?;
    let second = repo.commit("Return a value", "2018-02-03 04:05:06 +0200")?;
    Ok((repo, first, second))
}

/// A scratch Mercurial repository with deterministic commits
pub struct HgFixture {
    pub dir: TempDir,
}

impl HgFixture {
    pub fn new() -> anyhow::Result<Self> {
        let fixture = Self { dir: TempDir::new()? };
        fixture.hg(&["init"])?;
        Ok(fixture)
    }

    /// Run hg in the repository, ignoring user configuration
    pub fn hg(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = Command::new("hg")
            .args(["--config", "ui.username=Upstream Test <test@example.com>"])
            .args(args)
            .current_dir(self.dir.path())
            .env("HGRCPATH", "")
            .env("HGPLAIN", "1")
            .output()
            .context("running hg")?;
        anyhow::ensure!(
            output.status.success(),
            "hg {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    pub fn write(&self, rel: &str, content: &str) -> anyhow::Result<()> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Commit everything at `date` and return the changeset id
    pub fn commit(&self, message: &str, date: &str) -> anyhow::Result<String> {
        self.hg(&["commit", "-q", "-A", "-m", message, "-d", date])?;
        self.hg(&["log", "-r", ".", "-T", "{node}"])
    }

    /// Tag `rev`; Mercurial records the tag as a new changeset at `date`
    pub fn tag(&self, name: &str, rev: &str, date: &str) -> anyhow::Result<String> {
        self.hg(&["tag", "-r", rev, "-d", date, name])?;
        self.hg(&["log", "-r", "tip", "-T", "{node}"])
    }

    pub fn checkout(&self) -> Result<WorkingTree> {
        WorkingTree::new(&RepoRoot::new(self.dir.path().to_string_lossy(), "hg"))
    }
}

#[cfg(test)]
mod git_tests {
    use super::*;

    #[test]
    fn test_version_tags_newest_first() {
        if !tool_available("git") {
            return;
        }
        let repo = GitFixture::new().unwrap();
        repo.write("a.txt", "1").unwrap();
        repo.commit("one", "2018-01-01 00:00:00 +0000").unwrap();
        for tag in ["v1.0.0", "v1.10.0", "release-x", "v1.2.0", "v2.0.0-rc.1", "1.5.0"] {
            repo.tag(tag).unwrap();
        }

        let mut tree = repo.checkout().unwrap();
        assert_eq!(
            tree.version_tags().unwrap(),
            vec!["v2.0.0-rc.1", "v1.10.0", "1.5.0", "v1.2.0", "v1.0.0"]
        );
        tree.close().unwrap();
    }

    #[test]
    fn test_pseudo_version_of_untagged_revision() {
        if !tool_available("git") {
            return;
        }
        let (repo, first, second) = two_commit_history().unwrap();
        let tree = repo.checkout().unwrap();

        assert_eq!(tree.revision_from_tag("v1.2.3").unwrap(), first);
        assert_eq!(tree.reachable_tag(&second).unwrap(), "v1.2.3");
        // +0200 commit time is reported in UTC
        assert_eq!(
            tree.pseudo_version(&second).unwrap(),
            format!("v1.2.4-0.20180203020506-{}", &second[..12])
        );
    }

    #[test]
    fn test_pseudo_version_without_tags() {
        if !tool_available("git") {
            return;
        }
        let repo = GitFixture::new().unwrap();
        repo.write("a.txt", "1").unwrap();
        let rev = repo.commit("one", "2019-06-07 08:09:10 +0000").unwrap();

        let tree = repo.checkout().unwrap();
        assert!(matches!(tree.reachable_tag(&rev), Err(UpstreamError::VersionNotFound)));
        assert_eq!(
            tree.pseudo_version(&rev).unwrap(),
            format!("v0.0.0-0.20190607080910-{}", &rev[..12])
        );
    }

    #[test]
    fn test_pseudo_version_after_non_semver_tag() {
        if !tool_available("git") {
            return;
        }
        let repo = GitFixture::new().unwrap();
        repo.write("a.txt", "1").unwrap();
        repo.commit("one", "2019-06-07 08:09:10 +0000").unwrap();
        repo.tag("release-4").unwrap();
        repo.write("a.txt", "2").unwrap();
        let rev = repo.commit("two", "2019-06-08 00:00:00 +0000").unwrap();

        let tree = repo.checkout().unwrap();
        assert_eq!(
            tree.pseudo_version(&rev).unwrap(),
            format!("release-4-1.20190608000000-{}", &rev[..12])
        );
    }

    #[test]
    fn test_reachable_tag_prefers_semver_sibling() {
        if !tool_available("git") {
            return;
        }
        let repo = GitFixture::new().unwrap();
        repo.write("a.txt", "1").unwrap();
        repo.commit("one", "2019-01-01 00:00:00 +0000").unwrap();
        repo.tag("aaa-legacy").unwrap();
        repo.tag("v0.3.0").unwrap();
        repo.write("a.txt", "2").unwrap();
        let rev = repo.commit("two", "2019-01-02 00:00:00 +0000").unwrap();

        let tree = repo.checkout().unwrap();
        assert_eq!(tree.reachable_tag(&rev).unwrap(), "v0.3.0");
    }

    #[test]
    fn test_unknown_tag_and_revision() {
        if !tool_available("git") {
            return;
        }
        let (repo, _, _) = two_commit_history().unwrap();
        let tree = repo.checkout().unwrap();

        let err = tree.revision_from_tag("v9.9.9").unwrap_err();
        assert!(matches!(err, UpstreamError::NotFound(_)));
        assert!(err.is_recoverable());
        assert!(tree.file_hashes_from_ref("no-such-ref", "").is_err());
    }

    #[test]
    fn test_file_hashes_match_local_copy() {
        if !tool_available("git") {
            return;
        }
        let (repo, first, _) = two_commit_history().unwrap();
        let tree = repo.checkout().unwrap();

        let upstream = tree.file_hashes_from_ref(&first, "errors").unwrap();
        for spelling in ["./errors", "errors/"] {
            assert_eq!(tree.file_hashes_from_ref(&first, spelling).unwrap(), upstream);
        }
        assert_eq!(
            upstream.paths().collect::<Vec<_>>(),
            vec![Path::new("doc.go"), Path::new("errors.go")]
        );

        let local = vendor(&[("doc.go", DOC_V1), ("errors.go", ERRORS_V1)]).unwrap();
        let reconciler = Reconciler::new(ReconcileOptions::default()).unwrap();
        let hashes = reconciler
            .local_hashes(&tree, local.path(), Path::new("errors"))
            .unwrap();
        assert_eq!(hashes, upstream);

        let head = tree.revisions().unwrap().remove(0);
        let newer = tree.file_hashes_from_ref(&head, "errors").unwrap();
        assert_eq!(newer.mismatches(&hashes), vec![Path::new("errors.go").to_path_buf()]);
    }

    #[test]
    fn test_tag_sync_and_strip() {
        if !tool_available("git") {
            return;
        }
        let (repo, _, second) = two_commit_history().unwrap();
        let mut tree = repo.checkout().unwrap();
        let dir = tree.dir().unwrap().to_path_buf();

        tree.rev_sync(&second).unwrap();
        assert_eq!(fs::read_to_string(dir.join("errors/errors.go")).unwrap(), ERRORS_V2);
        tree.tag_sync("v1.2.3").unwrap();
        assert_eq!(fs::read_to_string(dir.join("errors/errors.go")).unwrap(), ERRORS_V1);

        let mut out = Vec::new();
        assert!(tree.strip_import_comment("errors/doc.go", &mut out).unwrap());
        assert_eq!(String::from_utf8(out).unwrap(), DOC_V1_STRIPPED);

        assert!(matches!(tree.tag_sync("v0.0.1"), Err(UpstreamError::Checkout(_))));
    }

    #[test]
    fn test_describe_vendored_copies() {
        if !tool_available("git") {
            return;
        }
        let (repo, first, second) = two_commit_history().unwrap();
        let mut tree = repo.checkout().unwrap();
        let reconciler = Reconciler::new(ReconcileOptions::default()).unwrap();
        let sub = Path::new("errors");

        // Import comment removed by the vendoring tool
        let tagged = vendor(&[("doc.go", DOC_V1_STRIPPED), ("errors.go", ERRORS_V1)]).unwrap();
        let found = reconciler.describe(&mut tree, tagged.path(), sub).unwrap();
        assert_eq!(found.tag.as_deref(), Some("v1.2.3"));
        assert_eq!(found.rev, first);

        let untagged = vendor(&[("errors.go", ERRORS_V2)]).unwrap();
        let found = reconciler.describe(&mut tree, untagged.path(), sub).unwrap();
        assert_eq!(found.tag, None);
        assert_eq!(found.rev, second);
        assert_eq!(found.version, format!("v1.2.4-0.20180203020506-{}", &second[..12]));

        let modified = vendor(&[("errors.go", "package errors\n// local patch\n")]).unwrap();
        assert!(matches!(
            reconciler.describe(&mut tree, modified.path(), sub),
            Err(UpstreamError::NoMatch(_))
        ));
    }

    #[test]
    fn test_write_diff_against_match() {
        if !tool_available("git") || !tool_available("diff") {
            return;
        }
        let (repo, first, _) = two_commit_history().unwrap();
        let mut tree = repo.checkout().unwrap();
        let reconciler = Reconciler::new(ReconcileOptions::default()).unwrap();
        let reference = Reference {
            tag: Some("v1.2.3".to_string()),
            rev: first,
            version: "v1.2.3".to_string(),
        };

        let local = vendor(&[
            ("doc.go", DOC_V1_STRIPPED),
            ("errors.go", "package errors\n// local patch\n"),
            ("extra.go", "package errors\n"),
        ])
        .unwrap();
        let mut out = Vec::new();
        let changed = reconciler
            .write_diff(&mut tree, &reference, local.path(), Path::new("errors"), &mut out)
            .unwrap();
        assert!(changed);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("+// local patch"));
        assert!(text.contains("--- /dev/null"));
        assert!(!text.contains("import"));
    }

    #[test]
    fn test_close_removes_checkout() {
        if !tool_available("git") {
            return;
        }
        let (repo, _, _) = two_commit_history().unwrap();
        let mut tree = repo.checkout().unwrap();
        let dir = tree.dir().unwrap().to_path_buf();
        assert!(dir.join(".git").exists());

        tree.close().unwrap();
        assert!(!dir.exists());
        assert!(matches!(tree.revisions(), Err(UpstreamError::Closed)));
    }

    #[test]
    fn test_clone_failure() {
        if !tool_available("git") {
            return;
        }
        let missing = TempDir::new().unwrap();
        let root = RepoRoot::new(missing.path().join("nope").to_string_lossy(), "git");
        assert!(matches!(WorkingTree::new(&root), Err(UpstreamError::Checkout(_))));
    }
}

#[cfg(test)]
mod hg_tests {
    use super::*;

    /// v1.2.3 on the first changeset; the tagging changeset follows it
    fn tagged_history() -> anyhow::Result<(HgFixture, String, String)> {
        let repo = HgFixture::new()?;
        repo.write("README.md", "# errors\n")?;
        repo.write("errors/doc.go", DOC_V1)?;
        repo.write("errors/errors.go", ERRORS_V1)?;
        let first = repo.commit("Initial", "2018-01-02 15:04:05 +0000")?;
        let tagging = repo.tag("v1.2.3", &first, "2018-02-03 04:05:06 +0200")?;
        Ok((repo, first, tagging))
    }

    #[test]
    fn test_tags_and_revisions() {
        if !tool_available("hg") {
            return;
        }
        let (repo, first, tagging) = tagged_history().unwrap();
        let mut tree = repo.checkout().unwrap();

        assert_eq!(tree.version_tags().unwrap(), vec!["v1.2.3"]);
        assert_eq!(tree.revision_from_tag("v1.2.3").unwrap(), first);
        assert_eq!(tree.revisions().unwrap(), vec![tagging.clone(), first]);
        assert!(matches!(
            tree.revision_from_tag("v9.9.9"),
            Err(UpstreamError::NotFound(_))
        ));

        assert_eq!(tree.reachable_tag(&tagging).unwrap(), "v1.2.3");
        assert_eq!(
            tree.pseudo_version(&tagging).unwrap(),
            format!("v1.2.4-0.20180203020506-{}", &tagging[..12])
        );
        tree.close().unwrap();
    }

    #[test]
    fn test_describe_vendored_copy() {
        if !tool_available("hg") {
            return;
        }
        let (repo, first, _) = tagged_history().unwrap();
        let mut tree = repo.checkout().unwrap();

        let upstream = tree.file_hashes_from_ref("v1.2.3", "./errors").unwrap();
        assert_eq!(
            upstream.paths().collect::<Vec<_>>(),
            vec![Path::new("doc.go"), Path::new("errors.go")]
        );

        let local = vendor(&[("doc.go", DOC_V1_STRIPPED), ("errors.go", ERRORS_V1)]).unwrap();
        let reconciler = Reconciler::new(ReconcileOptions::default()).unwrap();
        let found = reconciler
            .describe(&mut tree, local.path(), Path::new("errors"))
            .unwrap();
        assert_eq!(found.tag.as_deref(), Some("v1.2.3"));
        assert_eq!(found.rev, first);
    }
}
