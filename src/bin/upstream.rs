//! # Upstream CLI - Which version did we vendor?
//!
//! Command-line front end for the upstream library.
//!
//! ## Features
//! - List the version tags of a repository, newest first
//! - Compute the pseudo-version of any revision
//! - Find the tag or revision a vendored directory was copied from
//! - Show how a vendored copy differs from its upstream
//!
//! ## Usage
//! ```bash
//! # Version tags of a repository
//! upstream tags --repo https://github.com/pkg/errors
//!
//! # Pseudo-version of a revision
//! upstream pseudo --repo https://github.com/pkg/errors 614d223910a1
//!
//! # Where did vendor/github.com/pkg/errors come from?
//! upstream describe --repo https://github.com/pkg/errors vendor/github.com/pkg/errors
//! ```
//!
//! ## Exit status
//! - `0`: success
//! - `1`: error
//! - `2`: `describe` found no matching tag or revision

use clap::{Args, Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use upstream::{
    Reconciler, ReconcileOptions, Reference, RepoRoot, Result, UpstreamError, WorkingTree,
    WorkingTreeBuilder,
};

/// Exit status when no upstream ref matches
const EXIT_NO_MATCH: i32 = 2;

/// Upstream CLI - trace vendored code back to its source
#[derive(Parser)]
#[command(name = "upstream")]
#[command(version)]
#[command(about = "Find the upstream version a vendored copy was taken from")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Kill VCS commands that run longer than this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RepoArgs {
    /// Repository URL or local path
    #[arg(long)]
    repo: String,

    /// Version-control system serving the repository
    #[arg(long, default_value = "git", value_parser = ["git", "hg"])]
    vcs: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List version tags, newest first
    Tags {
        #[command(flatten)]
        repo: RepoArgs,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the pseudo-version of a revision
    Pseudo {
        #[command(flatten)]
        repo: RepoArgs,

        /// Revision to describe
        rev: String,
    },

    /// Find the tag or revision a vendored directory matches
    Describe {
        #[command(flatten)]
        repo: RepoArgs,

        /// Directory within the repository that was vendored
        #[arg(long, value_name = "PATH")]
        sub_path: Option<PathBuf>,

        /// Read exclude globs from a file, one per line
        #[arg(long, value_name = "FILE")]
        exclude_from: Option<PathBuf>,

        /// Glob of local files to ignore (repeatable)
        #[arg(short, long, value_name = "GLOB")]
        exclude: Vec<String>,

        /// Only consider tagged versions
        #[arg(long)]
        no_revisions: bool,

        /// Stop after this many revisions
        #[arg(long, value_name = "N")]
        max_revisions: Option<usize>,

        /// Compare Go files with their import comments intact
        #[arg(long)]
        keep_import_comments: bool,

        /// Show a unified diff against the match, or the newest version if none
        #[arg(long)]
        diff: bool,

        /// Print JSON (diff output would not parse, so not with --diff)
        #[arg(long, conflicts_with = "diff")]
        json: bool,

        /// Vendored copy to look up
        local_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(()) => {}
        Err(UpstreamError::NoMatch(dir)) => {
            eprintln!(
                "{}: no tag or revision matches {}",
                "No match".yellow().bold(),
                dir.display()
            );
            std::process::exit(EXIT_NO_MATCH);
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let timeout = cli.timeout.map(Duration::from_secs);

    match cli.command {
        Commands::Tags { repo, json } => cmd_tags(&repo, timeout, json),
        Commands::Pseudo { repo, rev } => cmd_pseudo(&repo, timeout, &rev),
        Commands::Describe {
            repo,
            sub_path,
            exclude_from,
            exclude,
            no_revisions,
            max_revisions,
            keep_import_comments,
            diff,
            json,
            local_dir,
        } => {
            let mut excludes = match exclude_from {
                Some(path) => read_excludes(&path)?,
                None => Vec::new(),
            };
            excludes.extend(exclude);

            let options = ReconcileOptions {
                excludes,
                strip_import_comments: !keep_import_comments,
                search_revisions: !no_revisions,
                max_revisions,
            };
            let sub_path = sub_path.unwrap_or_default();
            cmd_describe(&repo, timeout, options, &local_dir, &sub_path, diff, json)
        }
    }
}

/// List version tags
fn cmd_tags(repo: &RepoArgs, timeout: Option<Duration>, json: bool) -> Result<()> {
    let mut tree = open_tree(repo, timeout)?;
    let tags = tree.version_tags()?;
    tree.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
        return Ok(());
    }

    if tags.is_empty() {
        eprintln!("{}", "No version tags found".dimmed());
    }
    for tag in &tags {
        println!("{}", tag);
    }
    Ok(())
}

/// Print a pseudo-version
fn cmd_pseudo(repo: &RepoArgs, timeout: Option<Duration>, rev: &str) -> Result<()> {
    let mut tree = open_tree(repo, timeout)?;
    let version = tree.pseudo_version(rev)?;
    tree.close()?;

    println!("{}", version);
    Ok(())
}

/// Reconcile a vendored directory
///
/// Tags are tried newest first, then revisions. With `--diff`, the
/// differences against the match are printed; when nothing matches the
/// diff is taken against the newest version instead, to show how far off
/// the vendored copy is.
fn cmd_describe(
    repo: &RepoArgs,
    timeout: Option<Duration>,
    options: ReconcileOptions,
    local_dir: &Path,
    sub_path: &Path,
    show_diff: bool,
    json: bool,
) -> Result<()> {
    if !local_dir.is_dir() {
        return Err(UpstreamError::not_found(format!(
            "directory {}",
            local_dir.display()
        )));
    }

    let start = Instant::now();
    let reconciler = Reconciler::new(options)?;
    let progress = (!json).then(|| spinner(format!("Cloning {}...", repo.repo)));
    let mut tree = open_tree(repo, timeout)?;

    let result = reconciler.describe_with_progress(&mut tree, local_dir, sub_path, &mut |candidate| {
        if let Some(pb) = &progress {
            pb.set_message(format!("Trying {}", candidate));
        }
    });

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let found = match result {
        Ok(found) => found,
        Err(UpstreamError::NoMatch(dir)) if show_diff => {
            if let Some(nearest) = newest_reference(&tree)? {
                println!(
                    "{} {}",
                    "Differences from newest version".yellow().bold(),
                    nearest.version.cyan()
                );
                reconciler.write_diff(&mut tree, &nearest, local_dir, sub_path, &mut io::stdout().lock())?;
            }
            tree.close()?;
            return Err(UpstreamError::NoMatch(dir));
        }
        Err(e) => return Err(e),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        println!("{} {}", "✓".green().bold(), local_dir.display());
        println!("  Version: {}", found.version.yellow().bold());
        println!("  Revision: {}", found.short_rev().cyan());
        if found.tag.is_none() {
            println!("  {}", "(untagged revision)".dimmed());
        }
        println!("  Time: {}", format_duration(round_to_millis(start.elapsed())).to_string().cyan());
    }

    if show_diff {
        let changed = reconciler.write_diff(&mut tree, &found, local_dir, sub_path, &mut io::stdout().lock())?;
        if !changed && !json {
            println!("{}", "No differences".dimmed());
        }
    }

    tree.close()
}

/// Newest version tag, or the newest revision when there are no tags
fn newest_reference(tree: &WorkingTree) -> Result<Option<Reference>> {
    if let Some(tag) = tree.version_tags()?.into_iter().next() {
        let rev = tree.revision_from_tag(&tag)?;
        return Ok(Some(Reference {
            tag: Some(tag.clone()),
            rev,
            version: tag,
        }));
    }
    match tree.revisions()?.into_iter().next() {
        Some(rev) => {
            let version = tree.pseudo_version(&rev)?;
            Ok(Some(Reference {
                tag: None,
                rev,
                version,
            }))
        }
        None => Ok(None),
    }
}

/// Clone the repository into a scratch checkout
fn open_tree(repo: &RepoArgs, timeout: Option<Duration>) -> Result<WorkingTree> {
    let mut builder = WorkingTreeBuilder::new();
    if let Some(timeout) = timeout {
        builder = builder.command_timeout(timeout);
    }
    builder.build(&RepoRoot::new(repo.repo.as_str(), repo.vcs.as_str()))
}

/// One glob per line; blank lines and `#` comments are skipped
fn read_excludes(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| UpstreamError::io(format!("read {}", path.display()), e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    pb
}

fn round_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
