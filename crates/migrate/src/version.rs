//! Version identifiers
//!
//! A migration identifier is either a strict semantic version or an opaque
//! name. Only semantic versions take part in ordering.

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::cmp::Ordering;
use std::fmt;

/// Version reported when nothing has been applied
pub const ZERO_VERSION: &str = "0.0.0";

static SEMVER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9]+)\.([0-9]+)\.([0-9]+)(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+[0-9A-Za-z-]+)?$",
    )
    .expect("semver pattern is valid")
});

/// A classified migration identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionId {
    Semver(Version),
    Named(String),
}

impl VersionId {
    /// Classify an identifier. Empty identifiers are rejected.
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        Some(match parse_semver(id) {
            Some(version) => VersionId::Semver(version),
            None => VersionId::Named(id.to_string()),
        })
    }

    /// Whether this is a semantic version
    pub fn is_semver(&self) -> bool {
        matches!(self, VersionId::Semver(_))
    }

    /// The semantic version, if any
    pub fn as_semver(&self) -> Option<&Version> {
        match self {
            VersionId::Semver(version) => Some(version),
            VersionId::Named(_) => None,
        }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionId::Semver(version) => write!(f, "{}", version),
            VersionId::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Parse a strict `MAJOR.MINOR.PATCH[-pre][+build]` version
pub fn parse_semver(id: &str) -> Option<Version> {
    if !SEMVER_PATTERN.is_match(id) {
        return None;
    }
    Version::parse(id).ok()
}

/// Whether `id` is a strict semantic version
pub fn is_semver(id: &str) -> bool {
    parse_semver(id).is_some()
}

/// Semver precedence of two identifiers; build metadata is ignored.
///
/// Returns `None` unless both identifiers are semantic versions.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    let a = parse_semver(a)?;
    let b = parse_semver(b)?;
    Some(a.cmp_precedence(&b))
}

/// Sort semantic version strings ascending by precedence, dropping anything else
pub fn sort_semver(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut parsed: Vec<(Version, String)> = ids
        .into_iter()
        .filter_map(|id| parse_semver(&id).map(|version| (version, id)))
        .collect();
    parsed.sort_by(|(a, _), (b, _)| a.cmp_precedence(b));
    parsed.into_iter().map(|(_, id)| id).collect()
}
