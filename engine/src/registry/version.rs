//! Version ordering for "latest version" resolution
//!
//! Versions that parse as semver (after dropping a leading `v` and padding
//! `1` or `1.0` out to three components) sort by semver precedence and rank
//! above anything that does not parse. Unparseable versions compare
//! lexically among themselves.

use sdk::PluginDescriptor;
use semver::Version;
use std::cmp::Ordering;

fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(bare) {
        return Some(version);
    }

    // Pad the numeric core ("1.0-beta" -> "1.0.0-beta")
    let core_end = bare.find(['-', '+']).unwrap_or(bare.len());
    let (core, suffix) = bare.split_at(core_end);
    let parts = core.split('.').count();
    if core.is_empty() || parts >= 3 {
        return None;
    }
    let padded = format!("{}{}{}", core, ".0".repeat(3 - parts), suffix);
    Version::parse(&padded).ok()
}

/// Total order over version strings
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(left), Some(right)) => left.cmp(&right).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// The descriptor with the highest version, if any
pub fn latest(descriptors: impl IntoIterator<Item = PluginDescriptor>) -> Option<PluginDescriptor> {
    descriptors
        .into_iter()
        .max_by(|a, b| compare_versions(&a.version, &b.version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::ContentId;

    fn d(version: &str) -> PluginDescriptor {
        PluginDescriptor::new("p", version, ContentId::new(version), "")
    }

    #[test]
    fn short_versions_are_padded() {
        // Equal precedence falls back to the raw text so the order stays total
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("v2", "1.9.9"), Ordering::Greater);
    }

    #[test]
    fn prerelease_sorts_below_release() {
        assert_eq!(compare_versions("1.0-beta", "1.0"), Ordering::Less);
    }

    #[test]
    fn semver_beats_free_form() {
        assert_eq!(compare_versions("0.0.1", "nightly"), Ordering::Greater);
        assert_eq!(compare_versions("alpha", "beta"), Ordering::Less);
    }

    #[test]
    fn latest_picks_highest() {
        let found = latest(vec![d("1.0"), d("1.10"), d("latest"), d("1.2.3")]).unwrap();
        assert_eq!(found.version, "1.10");
        assert!(latest(Vec::new()).is_none());
    }
}
