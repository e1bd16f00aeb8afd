//! Semantic version tags and pseudo-versions
//!
//! ## Version tags
//!
//! Tags such as `v1.2.3` or `1.4.0-rc.1` are parsed as semantic versions
//! (the leading `v` is optional, and `v1.2` reads as `v1.2.0`). Tags that
//! do not parse are ordinary VCS tags and take no part in version ordering.
//! [`sort_version_tags`] orders the parseable ones newest first by semver
//! precedence, ignoring build metadata; tags with equal precedence keep
//! their listing order.
//!
//! ## Pseudo-versions
//!
//! An untagged revision still needs a version that sorts sensibly.
//! [`pseudo_version`] derives one from the nearest reachable tag and the
//! revision's commit time:
//!
//! | reachable tag          | result                                      |
//! |------------------------|---------------------------------------------|
//! | none                   | `v0.0.0-0.<time>-<rev12>`                   |
//! | `v1.2.3`               | `v1.2.4-0.<time>-<rev12>`                   |
//! | `v1.2.3-beta`          | `v1.2.3-beta.0.<time>-<rev12>`              |
//! | `legacy-tag-1`         | `legacy-tag-1-1.<time>-<rev12>`             |
//!
//! `<time>` is the UTC commit time as `YYYYMMDDhhmmss`.
//!
//! ```rust
//! use chrono::{DateTime, TimeZone, Utc};
//! use upstream::version::{pseudo_version, Describable};
//! use upstream::{Result, UpstreamError};
//!
//! struct Untagged;
//!
//! impl Describable for Untagged {
//!     fn reachable_tag(&self, _rev: &str) -> Result<String> {
//!         Err(UpstreamError::VersionNotFound)
//!     }
//!     fn time_from_revision(&self, _rev: &str) -> Result<DateTime<Utc>> {
//!         Ok(Utc.with_ymd_and_hms(2019, 1, 2, 3, 4, 5).unwrap())
//!     }
//! }
//!
//! let version = pseudo_version(&Untagged, "abcdef0123456789").unwrap();
//! assert_eq!(version, "v0.0.0-0.20190102030405-abcdef012345");
//! ```

use crate::error::{Result, UpstreamError};
use chrono::{DateTime, Utc};
use semver::{BuildMetadata, Version};
use std::cmp::Ordering;
use tracing::debug;

/// Number of revision characters kept in a pseudo-version
pub const REV_PREFIX_LEN: usize = 12;

/// Layout of the timestamp embedded in pseudo-versions
pub const PSEUDO_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// The queries needed to build a pseudo-version
pub trait Describable {
    /// Most recent tag reachable from `rev`, preferring semver tags
    ///
    /// Returns [`UpstreamError::VersionNotFound`] when no tag is reachable.
    fn reachable_tag(&self, rev: &str) -> Result<String>;

    /// Commit timestamp of `rev`
    fn time_from_revision(&self, rev: &str) -> Result<DateTime<Utc>>;
}

/// Parse a tag as a semantic version, allowing a leading `v`
///
/// Short forms `v1` and `v1.2` are read as `v1.0.0` and `v1.2.0`.
pub fn parse_version(tag: &str) -> Option<Version> {
    let trimmed = tag.strip_prefix('v').unwrap_or(tag);
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    let numeric = |p: &&str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    if parts.len() > 2 || !parts.iter().all(numeric) {
        return None;
    }

    let padded = format!("{}{}{}", core, ".0".repeat(3 - parts.len()), rest);
    Version::parse(&padded).ok()
}

/// Compare by semver precedence; build metadata does not participate
pub fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// Keep the tags that parse as versions, newest first
pub fn sort_version_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut versions: Vec<(Version, String)> = tags
        .into_iter()
        .map(Into::into)
        .filter_map(|tag| parse_version(&tag).map(|v| (v, tag)))
        .collect();

    // Stable: equal precedence keeps listing order
    versions.sort_by(|(a, _), (b, _)| cmp_precedence(b, a));
    versions.into_iter().map(|(_, tag)| tag).collect()
}

/// Pick the preferred tag among tags on the same commit
///
/// Semver tags win over others; the highest version wins among semver tags
/// and the lexically smallest name among the rest.
pub fn preferred_tag<'a, I>(tags: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let tags: Vec<&str> = tags.into_iter().filter(|t| !t.is_empty()).collect();
    if let Some(newest) = sort_version_tags(tags.iter().copied()).into_iter().next() {
        return Some(newest);
    }
    tags.into_iter().min().map(str::to_string)
}

/// Base version and separator for a pseudo-version, from the reachable tag
fn pseudo_base(reachable: Result<String>) -> Result<(String, &'static str)> {
    let tag = match reachable {
        Ok(tag) => tag,
        Err(UpstreamError::VersionNotFound) => return Ok(("v0.0.0".to_string(), "-0.")),
        Err(e) => return Err(e),
    };

    let Some(mut version) = parse_version(&tag) else {
        // Not semver: the commit comes after a legacy tag, ordered lexically
        return Ok((tag, "-1."));
    };

    version.build = BuildMetadata::EMPTY;
    let suffix = if version.pre.is_empty() {
        version.patch += 1;
        "-0."
    } else {
        ".0."
    };

    Ok((format!("v{}", version), suffix))
}

/// Comparable version string for `rev`, derived from its reachable tag
///
/// Fails only if the tag lookup fails for a reason other than
/// [`UpstreamError::VersionNotFound`], or the commit time cannot be read.
pub fn pseudo_version<D: Describable + ?Sized>(describable: &D, rev: &str) -> Result<String> {
    let (version, suffix) = pseudo_base(describable.reachable_tag(rev))?;
    let time = describable.time_from_revision(rev)?;

    let prefix_end = rev
        .char_indices()
        .nth(REV_PREFIX_LEN)
        .map_or(rev.len(), |(i, _)| i);
    let pseudo = format!(
        "{}{}{}-{}",
        version,
        suffix,
        time.format(PSEUDO_TIME_FORMAT),
        &rev[..prefix_end]
    );
    debug!("Pseudo-version for {}: {}", rev, pseudo);
    Ok(pseudo)
}
