//! # Upstream - Trace vendored code back to its source
//!
//! A library for answering "which upstream version is this vendored copy?"
//! by checking out the upstream repository and comparing file content
//! across its history.
//!
//! ## Overview
//!
//! Upstream provides a uniform view over a disposable checkout of a git or
//! Mercurial repository, allowing you to:
//! - List version tags, newest first, by semantic-version precedence
//! - Derive a Go-modules style pseudo-version for any revision
//! - Fingerprint the files under a sub-path at any tag or revision
//! - Strip Go import comments so rewritten copies still compare equal
//! - Produce unified diffs between vendored files and the checkout
//! - Find the newest tag or revision a vendored directory reproduces
//!
//! ## Architecture
//!
//! - **Command runner**: every external program (`git`, `hg`, `diff`) runs
//!   through a [`CommandRunner`] injected at construction, so tests can
//!   script backend output
//! - **Backends**: a [`vcs::Vcs`] implementation per version-control system,
//!   chosen once when the checkout is created
//! - **Hashing**: a [`Hasher`] per backend; git trees compare by blob id,
//!   Mercurial trees by SHA-256
//! - **Scoped cleanup**: the checkout directory is owned by the
//!   [`WorkingTree`] and removed on [`WorkingTree::close`] or drop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use upstream::{Reconciler, ReconcileOptions, RepoRoot, WorkingTree};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = RepoRoot::new("https://github.com/pkg/errors", "git");
//! let mut tree = WorkingTree::new(&root)?;
//!
//! let reconciler = Reconciler::new(ReconcileOptions::default())?;
//! let found = reconciler.describe(
//!     &mut tree,
//!     Path::new("vendor/github.com/pkg/errors"),
//!     Path::new(""),
//! )?;
//! println!("vendored copy is {} ({})", found.version, found.short_rev());
//!
//! tree.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pseudo-versions
//!
//! A revision with no tag of its own is named after the nearest tag
//! reachable from it, its commit time in UTC and a 12-character revision
//! prefix:
//!
//! | Reachable tag   | Pseudo-version                          |
//! |-----------------|-----------------------------------------|
//! | `v1.2.3`        | `v1.2.4-0.20180102150405-abcdef012345`  |
//! | `v1.2.3-pre`    | `v1.2.3-pre.0.20180102150405-abcdef012345` |
//! | `release-4`     | `release-4-1.20180102150405-abcdef012345` |
//! | none            | `v0.0.0-0.20180102150405-abcdef012345`  |
//!
//! ## Error Handling
//!
//! All operations return `Result<T, UpstreamError>`. Expected "nothing
//! found" outcomes ([`UpstreamError::NotFound`],
//! [`UpstreamError::VersionNotFound`], [`UpstreamError::NoMatch`]) are kept
//! apart from tool failures; see [`UpstreamError::is_recoverable`].
//!
//! ## Module Organization
//!
//! - [`working_tree`]: checkout lifecycle and the operations on it
//! - [`vcs`]: backend trait and the git and Mercurial backends
//! - [`version`]: tag ordering and pseudo-versions
//! - [`hasher`]: fingerprinting strategies and tree hashing
//! - [`normalize`]: import-comment stripping
//! - [`diff`]: the unified diff wrapper
//! - [`reconcile`]: matching a vendored copy against history
//! - [`process`]: external command execution
//! - [`types`]: common types and data structures
//! - [`error`]: error types and handling

// Public API modules
pub mod diff;
pub mod error;
pub mod hasher;
pub mod normalize;
pub mod process;
pub mod reconcile;
pub mod types;
pub mod vcs;
pub mod version;
pub mod working_tree;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use error::{Result, UpstreamError};
pub use hasher::{GitHasher, Hasher, Sha256Hasher};
pub use process::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use reconcile::{ReconcileOptions, Reconciler};
pub use types::*;
pub use version::{pseudo_version, Describable};
pub use working_tree::{WorkingTree, WorkingTreeBuilder};
