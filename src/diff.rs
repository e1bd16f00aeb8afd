//! Unified diffs between an upstream file and a vendored copy
//!
//! Rendering is delegated to the system `diff -u`. Its exit status is part
//! of the contract:
//!
//! - `0`: no differences
//! - `1`: differences found (not an error)
//! - anything else, or termination by a signal: the tool itself failed
//!
//! Whatever `diff` printed is written to the caller's sink in every case.

use crate::error::{Result, UpstreamError};
use crate::process::{CommandRunner, Invocation};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Stand-in for a file that does not exist on the upstream side
pub const NULL_DEVICE: &str = "/dev/null";

/// Write `diff -u` output comparing `upstream` with `local` to `out`
///
/// `upstream == None` compares against an empty file, for vendored files
/// with no upstream counterpart. Returns whether the two differ.
pub fn unified_diff(
    runner: &dyn CommandRunner,
    out: &mut dyn Write,
    upstream: Option<&Path>,
    local: &Path,
) -> Result<bool> {
    let upstream = upstream.map_or_else(|| NULL_DEVICE.to_string(), |p| p.to_string_lossy().into_owned());
    let inv = Invocation::new(
        "diff",
        ["-u".to_string(), upstream, local.to_string_lossy().into_owned()],
    );
    let output = runner.run(&inv)?;

    out.write_all(&output.stdout)
        .map_err(|e| UpstreamError::io("write diff output", e))?;

    match output.status {
        Some(0) => Ok(false),
        Some(1) => {
            debug!("{} differs from upstream", local.display());
            Ok(true)
        }
        status => Err(UpstreamError::DiffTool {
            status,
            stderr: output.stderr_str(),
        }),
    }
}
