//! The repository abstraction selectors work against.

use async_trait::async_trait;

use crate::artifact::Artifact;
use crate::error::Result;
use crate::platform::PlatformConstraint;

/// Read access to the tags and images of one repository.
///
/// Lookups that find nothing, or find an image for another platform,
/// return `Ok(None)` rather than an error.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Lists every tag in the repository.
    async fn tags(&self) -> Result<Vec<String>>;

    /// Resolves the image a tag currently points at.
    ///
    /// Tags are mutable, so implementations never cache this lookup.
    async fn artifact_by_tag(
        &self,
        tag: &str,
        platform: Option<&PlatformConstraint>,
    ) -> Result<Option<Artifact>>;

    /// Resolves an image by content digest.
    async fn artifact_by_digest(
        &self,
        digest: &str,
        platform: Option<&PlatformConstraint>,
    ) -> Result<Option<Artifact>>;
}
