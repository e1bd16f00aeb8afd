//! Import-comment stripping
//!
//! Go packages once pinned their canonical import path with a comment on
//! the package clause:
//!
//! ```text
//! package foo // import "example.com/foo"
//! package foo /* import "example.com/foo" */
//! ```
//!
//! Vendoring tools removed these comments when copying code, so a vendored
//! file and its upstream original can differ only by this annotation.
//! [`strip_import_comment`] rewrites a file without it so both sides hash
//! and diff the same.
//!
//! Every emitted line ends with `\n`. A final line without one gets it
//! added, and that alone counts as a change.

use crate::error::{Result, UpstreamError};
use regex::bytes::Regex;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::LazyLock;

/// File extensions whose content is subject to stripping
pub const STRIPPABLE_EXTENSIONS: &[&str] = &["go"];

static IMPORT_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    // ASCII classes: `\w` must not accept non-ASCII package names
    let quoted = r#"(?:"[^"]+"|`[^`]+`)"#;
    let import = format!(r"\s*import\s+{}\s*", quoted);
    let pattern = format!(
        r"(?-u)^(package\s+\w+)\s+(?://{import}$|/\*{import}\*/)(.*)$",
        import = import
    );
    Regex::new(&pattern).expect("import comment pattern is valid")
});

/// Whether files at `path` are subject to import-comment stripping
pub fn is_strippable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| STRIPPABLE_EXTENSIONS.contains(&ext))
}

/// Rewrite one line (without its newline), or `None` if it has no annotation
pub fn strip_line(line: &[u8]) -> Option<Vec<u8>> {
    let caps = IMPORT_COMMENT.captures(line)?;
    let mut out = caps[1].to_vec();
    out.extend_from_slice(&caps[2]);
    Some(out)
}

/// Copy `reader` to `writer` with import comments removed
///
/// Returns whether the output differs from the input.
pub fn strip_import_comment<R: BufRead, W: Write + ?Sized>(mut reader: R, writer: &mut W) -> Result<bool> {
    let mut changed = false;
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| UpstreamError::io("strip import comment", e))?;
        if read == 0 {
            break;
        }

        let body = match line.strip_suffix(b"\n") {
            Some(body) => body,
            None => {
                changed = true;
                &line[..]
            }
        };

        let rewritten = strip_line(body);
        if rewritten.is_some() {
            changed = true;
        }
        let body = rewritten.as_deref().unwrap_or(body);

        writer
            .write_all(body)
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| UpstreamError::io("strip import comment", e))?;
    }

    Ok(changed)
}
