//! Property-based testing for upstream
//!
//! Uses proptest to check version ordering, pseudo-version shape and
//! import-comment normalization across generated inputs.

use ::upstream::normalize::strip_import_comment;
use ::upstream::version::{cmp_precedence, parse_version, sort_version_tags};
use ::upstream::*;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::cmp::Ordering;

/// Fixed answers for pseudo-version queries
struct Fixed {
    tag: Option<String>,
    time: DateTime<Utc>,
}

impl Describable for Fixed {
    fn reachable_tag(&self, _rev: &str) -> Result<String> {
        self.tag.clone().ok_or(UpstreamError::VersionNotFound)
    }

    fn time_from_revision(&self, _rev: &str) -> Result<DateTime<Utc>> {
        Ok(self.time)
    }
}

/// Tags that parse as semantic versions, with and without `v`
fn version_tag_strategy() -> impl Strategy<Value = String> {
    (
        any::<bool>(),
        0..20u64,
        0..20u64,
        0..20u64,
        prop::option::of(prop_oneof!["alpha", "beta", "rc\\.[1-9]"]),
    )
        .prop_map(|(v, major, minor, patch, pre)| {
            let mut tag = format!("{}{}.{}.{}", if v { "v" } else { "" }, major, minor, patch);
            if let Some(pre) = pre {
                tag.push('-');
                tag.push_str(&pre);
            }
            tag
        })
}

/// Tags that never parse as semantic versions
fn plain_tag_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "release-[0-9]{1,3}",
        "[a-z]{3,10}",
        "v[0-9]{1,2}\\.x",
    ]
}

fn rev_strategy() -> impl Strategy<Value = String> {
    "[0-9a-f]{40}"
}

fn time_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_000_000_000).prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Only version tags survive, newest first
    #[test]
    fn version_tags_are_sorted_descending(
        versions in prop::collection::vec(version_tag_strategy(), 0..30),
        plain in prop::collection::vec(plain_tag_strategy(), 0..10),
    ) {
        let all: Vec<String> = versions.iter().chain(plain.iter()).cloned().collect();
        let sorted = sort_version_tags(all.iter().map(String::as_str));

        prop_assert_eq!(sorted.len(), versions.len());
        let parsed: Vec<_> = sorted.iter().map(|t| parse_version(t).unwrap()).collect();
        for pair in parsed.windows(2) {
            prop_assert_ne!(cmp_precedence(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    /// Without any version tags there is nothing to order
    #[test]
    fn plain_tags_are_dropped(plain in prop::collection::vec(plain_tag_strategy(), 0..20)) {
        prop_assert!(sort_version_tags(plain.iter().map(String::as_str)).is_empty());
    }

    /// A pseudo-version sorts after its base release and before the next patch
    #[test]
    fn pseudo_version_sorts_between_releases(
        major in 0..50u64,
        minor in 0..50u64,
        patch in 0..50u64,
        rev in rev_strategy(),
        time in time_strategy(),
    ) {
        let tag = format!("v{}.{}.{}", major, minor, patch);
        let fixed = Fixed { tag: Some(tag.clone()), time };
        let pseudo = pseudo_version(&fixed, &rev).unwrap();

        prop_assert!(pseudo.ends_with(&rev[..12]));
        prop_assert_eq!(&pseudo, &pseudo_version(&fixed, &rev).unwrap());

        let base = parse_version(&tag).unwrap();
        let parsed = parse_version(&pseudo).unwrap();
        let next = parse_version(&format!("v{}.{}.{}", major, minor, patch + 1)).unwrap();
        prop_assert_eq!(cmp_precedence(&parsed, &base), Ordering::Greater);
        prop_assert_eq!(cmp_precedence(&parsed, &next), Ordering::Less);
    }

    /// Pseudo-versions of untagged histories always start at v0.0.0
    #[test]
    fn untagged_pseudo_version_shape(rev in rev_strategy(), time in time_strategy()) {
        let fixed = Fixed { tag: None, time };
        let pseudo = pseudo_version(&fixed, &rev).unwrap();
        let expected = format!("v0.0.0-0.{}-{}", time.format("%Y%m%d%H%M%S"), &rev[..12]);
        prop_assert_eq!(pseudo, expected);
    }

    /// Stripping is idempotent and only touches the package clause
    #[test]
    fn strip_import_comment_is_idempotent(
        package in "[a-z]{1,10}",
        path in "[a-z.]{1,20}(/[a-z]{1,10}){0,3}",
        body in prop::collection::vec("[a-zA-Z0-9 (){}]{0,40}", 0..10),
        block in any::<bool>(),
    ) {
        let comment = if block {
            format!("/* import \"{}\" */", path)
        } else {
            format!("// import \"{}\"", path)
        };
        let mut source = format!("package {} {}\n", package, comment);
        for line in &body {
            source.push_str(line);
            source.push('\n');
        }

        let mut once = Vec::new();
        prop_assert!(strip_import_comment(source.as_bytes(), &mut once).unwrap());
        let once = String::from_utf8(once).unwrap();
        let expected_prefix = format!("package {}\n", package);
        prop_assert!(once.starts_with(&expected_prefix));
        prop_assert!(once.ends_with(&source[source.find('\n').unwrap() + 1..]));

        let mut twice = Vec::new();
        prop_assert!(!strip_import_comment(once.as_bytes(), &mut twice).unwrap());
        prop_assert_eq!(once.as_bytes(), twice.as_slice());
    }
}
