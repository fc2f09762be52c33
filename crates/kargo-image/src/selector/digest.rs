//! Selection of the image a single named tag points at.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{cancellable, SelectionStrategy, Selector};
use crate::artifact::Artifact;
use crate::error::Result;
use crate::platform::PlatformConstraint;
use crate::repository::Repository;

/// Tracks the digest behind one mutable tag (e.g. `latest`).
///
/// The tag is looked up directly, so this never lists tags and makes at
/// most one manifest fetch (plus its config blob).
pub struct DigestSelector {
    repo: Arc<dyn Repository>,
    tag: String,
    platform: Option<PlatformConstraint>,
}

impl DigestSelector {
    /// Creates a selector tracking `tag`.
    #[must_use]
    pub fn new(repo: Arc<dyn Repository>, tag: String, platform: Option<PlatformConstraint>) -> Self {
        Self {
            repo,
            tag,
            platform,
        }
    }
}

#[async_trait]
impl Selector for DigestSelector {
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Artifact>> {
        cancellable(cancel, SelectionStrategy::Digest, async {
            let artifact = self
                .repo
                .artifact_by_tag(&self.tag, self.platform.as_ref())
                .await?;
            if artifact.is_none() {
                tracing::debug!(tag = %self.tag, "No image found for tag");
            }
            Ok(artifact.into_iter().collect())
        })
        .await
    }
}
