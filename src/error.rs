//! Error types for the upstream library
//!
//! This module defines all error types that can occur while checking out an
//! upstream repository, deriving versions from it, and comparing vendored
//! files against it. Errors carry enough context (command, path, status) to
//! tell a tool failure apart from an expected "nothing found" outcome.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Type alias for Results in the upstream library
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Main error type for all upstream operations
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error annotated with the operation that failed
    #[error("{context}: {source}")]
    IoContext {
        /// Operation being performed
        context: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Errors during JSON serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A backend command failed while creating or syncing the checkout
    #[error("Checkout failed: {0}")]
    Checkout(String),

    /// Requested tag or revision does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// No tag is reachable from the revision
    #[error("No reachable version tag")]
    VersionNotFound,

    /// The repository descriptor names a backend we cannot drive
    #[error("Unknown VCS backend: {0}")]
    UnknownBackend(String),

    /// The external diff tool exited with a status other than 0 or 1
    #[error("diff failed ({}): {stderr}", describe_status(.status))]
    DiffTool {
        /// Exit status, if the process exited normally
        status: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// A backend query command exited unsuccessfully
    #[error("{program} {args} failed: {stderr}")]
    Command {
        /// Program that was run
        program: String,
        /// Space-joined arguments
        args: String,
        /// Captured standard error
        stderr: String,
    },

    /// An external command did not finish in time and was killed
    #[error("{program} timed out after {}", humantime::format_duration(*.timeout))]
    CommandTimeout {
        /// Program that was run
        program: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Commit timestamp could not be parsed
    #[error("Invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    /// Exclude pattern parsing error
    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error")]
    WalkDir(#[from] walkdir::Error),

    /// Vendored tree matches no tag or revision
    #[error("No upstream tag or revision matches {0:?}")]
    NoMatch(PathBuf),

    /// The working tree was already closed
    #[error("Working tree is closed")]
    Closed,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UpstreamError {
    /// Create a checkout error with a custom message
    pub fn checkout(msg: impl Into<String>) -> Self {
        UpstreamError::Checkout(msg.into())
    }

    /// Create a not-found error with a custom message
    pub fn not_found(msg: impl Into<String>) -> Self {
        UpstreamError::NotFound(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        UpstreamError::Internal(msg.into())
    }

    /// Wrap an I/O error with the operation that produced it
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        UpstreamError::IoContext {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is an expected outcome the caller can act on
    ///
    /// These never indicate a broken tool or checkout; they describe what
    /// the repository does or does not contain.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            UpstreamError::NotFound(_) | UpstreamError::VersionNotFound | UpstreamError::NoMatch(_)
        )
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}
