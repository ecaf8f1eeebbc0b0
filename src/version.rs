//! # Release Version Arithmetic
//!
//! Helpers the tag planner uses to order existing tags and to find the next
//! release name.
//!
//! ## Ordering
//!
//! Tags are compared as semantic versions (an optional `v` prefix and a
//! `refs/tags/` prefix are accepted). [`sort_tags_descending`] puts the
//! highest version first; tags that are not valid versions keep their
//! relative order and follow every valid one.
//!
//! ## Increments
//!
//! A fresh release is a patch increment of the live version. When that name is
//! taken, [`next_unused`] keeps stepping with the same [`Increment`] until it
//! reaches a version no existing tag spells, whatever its prefix.

use std::cmp::Ordering;
use std::fmt;

use semver::Version;

use crate::git::parse_semver_tag;

/// Which component of a version to bump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Increment {
    Patch,
    Minor,
    Major,
}

impl fmt::Display for Increment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Increment::Patch => write!(f, "patch"),
            Increment::Minor => write!(f, "minor"),
            Increment::Major => write!(f, "major"),
        }
    }
}

/// Extract a semantic version from a tag or ref name
pub fn tag_version(ref_str: &str) -> Option<Version> {
    // Common patterns: v1.2.3, 1.2.3, refs/tags/v1.2.3, refs/tags/1.2.3
    let tag = ref_str.strip_prefix("refs/tags/").unwrap_or(ref_str);
    parse_semver_tag(tag)
}

/// Compare two tags by descending version; invalid tags sort last and
/// compare equal among themselves.
fn compare_descending(a: &str, b: &str) -> Ordering {
    match (tag_version(a), tag_version(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort tags highest version first.
pub fn sort_tags_descending(tags: &[String]) -> Vec<String> {
    let mut sorted = tags.to_vec();
    // sort_by is stable, non-version tags keep their listing order
    sorted.sort_by(|a, b| compare_descending(a, b));
    sorted
}

/// Find the highest semantic version among tags
pub fn find_latest_version(tags: &[String]) -> Option<(String, Version)> {
    tags.iter()
        .filter_map(|tag| tag_version(tag).map(|version| (tag.clone(), version)))
        .max_by(|(_, a), (_, b)| a.cmp(b))
}

/// Bump one component of a version, resetting the lower ones.
///
/// Pre-release and build metadata are dropped.
pub fn increment(version: &Version, by: Increment) -> Version {
    match by {
        Increment::Patch => Version::new(version.major, version.minor, version.patch + 1),
        Increment::Minor => Version::new(version.major, version.minor + 1, 0),
        Increment::Major => Version::new(version.major + 1, 0, 0),
    }
}

/// Whether any existing tag names this version.
pub fn tag_exists(version: &Version, tags: &[String]) -> bool {
    tags.iter()
        .any(|tag| tag_version(tag).as_ref() == Some(version))
}

/// First increment of `version` by `by` that no existing tag names.
pub fn next_unused(version: &Version, tags: &[String], by: Increment) -> Version {
    let mut candidate = increment(version, by);
    while tag_exists(&candidate, tags) {
        candidate = increment(&candidate, by);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tag_version() {
        assert_eq!(tag_version("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(tag_version("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(tag_version("refs/tags/v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(tag_version("refs/tags/1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(tag_version("main"), None);
        assert_eq!(tag_version("v1.2"), None); // Invalid semver
    }

    #[test]
    fn test_sort_tags_descending() {
        let sorted = sort_tags_descending(&tags(&[
            "v1.0.0", "nightly", "2.0.0", "1.10.0", "stable", "1.2.0",
        ]));
        assert_eq!(
            sorted,
            tags(&["2.0.0", "1.10.0", "1.2.0", "v1.0.0", "nightly", "stable"])
        );
    }

    #[test]
    fn test_sort_orders_prerelease_below_release() {
        let sorted = sort_tags_descending(&tags(&["1.0.0-rc.1", "1.0.0", "0.9.0"]));
        assert_eq!(sorted, tags(&["1.0.0", "1.0.0-rc.1", "0.9.0"]));
    }

    #[test]
    fn test_find_latest_version() {
        let (latest_tag, latest_ver) =
            find_latest_version(&tags(&["v1.0.0", "v1.1.0", "v2.0.0", "v1.5.0"])).unwrap();
        assert_eq!(latest_tag, "v2.0.0");
        assert_eq!(latest_ver, Version::new(2, 0, 0));
        assert!(find_latest_version(&tags(&["main"])).is_none());
    }

    #[test]
    fn test_increment() {
        let version = Version::parse("1.2.3-beta.1").unwrap();
        assert_eq!(increment(&version, Increment::Patch), Version::new(1, 2, 4));
        assert_eq!(increment(&version, Increment::Minor), Version::new(1, 3, 0));
        assert_eq!(increment(&version, Increment::Major), Version::new(2, 0, 0));
    }

    #[test]
    fn test_next_unused_skips_taken_patch() {
        let version = Version::new(1, 2, 0);
        let existing = tags(&["1.2.0", "1.2.1"]);
        assert_eq!(
            next_unused(&version, &existing, Increment::Patch),
            Version::new(1, 2, 2)
        );
    }

    #[test]
    fn test_next_unused_sees_prefixed_tags() {
        let version = Version::new(1, 2, 0);
        let existing = tags(&["v1.2.1", "1.2.2", "v2.0.0"]);
        assert_eq!(
            next_unused(&version, &existing, Increment::Patch),
            Version::new(1, 2, 3)
        );
        assert_eq!(
            next_unused(&version, &existing, Increment::Major),
            Version::new(3, 0, 0)
        );
    }
}
