//! Semantic version handling for image tags.
//!
//! Tag parsing is lenient by default:
//! - `v1.2.3` → `1.2.3`
//! - `1.2` → `1.2.0`
//! - `1` → `1.0.0`
//! - `1.2.3-rc.1+build.5` keeps pre-release and build metadata
//!
//! Constraints are comma-separated comparators, optionally combined with
//! `||` (e.g., `>=1.2, <2 || ^3.0`).

use std::cmp::Ordering;

use semver::{BuildMetadata, Prerelease, Version, VersionReq};

use crate::error::{ImageError, Result};

/// Parses an image tag as a semantic version.
///
/// With `strict` set, the tag must carry all three numeric components.
///
/// # Examples
///
/// ```
/// use kargo_image::version::parse_tag;
///
/// assert_eq!(parse_tag("v1.2", false).unwrap().to_string(), "1.2.0");
/// assert!(parse_tag("v1.2", true).is_none());
/// assert!(parse_tag("latest", false).is_none());
/// ```
#[must_use]
pub fn parse_tag(tag: &str, strict: bool) -> Option<Version> {
    let version = tag.strip_prefix('v').unwrap_or(tag);

    let (version, build) = match version.split_once('+') {
        Some((v, b)) => (v, Some(b)),
        None => (version, None),
    };
    let (core, pre) = match version.split_once('-') {
        Some((c, p)) => (c, Some(p)),
        None => (version, None),
    };

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || (strict && parts.len() != 3) {
        return None;
    }

    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Leading zeros are not valid semver.
        if part.len() > 1 && part.starts_with('0') {
            return None;
        }
        *slot = part.parse().ok()?;
    }

    let mut parsed = Version::new(numbers[0], numbers[1], numbers[2]);
    if let Some(pre) = pre {
        if pre.is_empty() {
            return None;
        }
        parsed.pre = Prerelease::new(pre).ok()?;
    }
    if let Some(build) = build {
        if build.is_empty() {
            return None;
        }
        parsed.build = BuildMetadata::new(build).ok()?;
    }
    Some(parsed)
}

/// Orders two tagged versions: higher precedence first, ties broken by the
/// lexically greater original tag.
///
/// Build metadata does not affect precedence.
#[must_use]
pub fn compare_tagged(a: (&Version, &str), b: (&Version, &str)) -> Ordering {
    b.0.cmp_precedence(a.0).then_with(|| b.1.cmp(a.1))
}

/// A semantic version range that tags must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionConstraint {
    /// Parses a constraint expression.
    ///
    /// # Examples
    ///
    /// ```
    /// use kargo_image::version::{parse_tag, VersionConstraint};
    ///
    /// let constraint = VersionConstraint::parse(">=1.2, <2 || ^3.0").unwrap();
    /// assert!(constraint.matches(&parse_tag("1.4.0", false).unwrap()));
    /// assert!(constraint.matches(&parse_tag("3.1.0", false).unwrap()));
    /// assert!(!constraint.matches(&parse_tag("2.0.0", false).unwrap()));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidConstraint`] if any alternative fails to
    /// parse.
    pub fn parse(input: &str) -> Result<Self> {
        let alternatives = input
            .split("||")
            .map(|alt| {
                VersionReq::parse(alt.trim()).map_err(|e| ImageError::InvalidConstraint {
                    constraint: input.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: input.to_string(),
            alternatives,
        })
    }

    /// Returns true if the version satisfies any alternative.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Returns the constraint as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}
