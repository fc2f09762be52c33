//! The artifact model returned by image selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version;

/// A container image identified by its content digest.
///
/// The tag is a mutable pointer to the digest at registry scope, so two
/// artifacts with equal digests are the same content regardless of tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Tag the artifact was discovered under, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Content digest (e.g., `sha256:...`).
    pub digest: String,

    /// Image creation time, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Semantic version parsed from the tag, if it is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semver: Option<semver::Version>,
}

impl Artifact {
    /// Creates an untagged artifact for the given digest.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self {
            tag: None,
            digest: digest.into(),
            created_at: None,
            semver: None,
        }
    }

    /// Sets the tag, opportunistically parsing it as a semantic version.
    ///
    /// # Examples
    ///
    /// ```
    /// use kargo_image::Artifact;
    ///
    /// let artifact = Artifact::new("sha256:abc").with_tag("v1.4");
    /// assert_eq!(artifact.semver.unwrap().to_string(), "1.4.0");
    ///
    /// let artifact = Artifact::new("sha256:abc").with_tag("latest");
    /// assert!(artifact.semver.is_none());
    /// ```
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.semver = version::parse_tag(&tag, false);
        self.tag = Some(tag);
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns true if both artifacts refer to the same content.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}
