//! In-memory repository for selector tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::artifact::Artifact;
use crate::error::{ImageError, Result};
use crate::platform::PlatformConstraint;
use crate::repository::Repository;

#[derive(Debug, Default)]
pub(crate) struct FakeRepository {
    tags: Vec<String>,
    images: HashMap<String, (Artifact, PlatformConstraint)>,
    failing: HashSet<String>,
    lookups: AtomicUsize,
}

/// Returns a fixed timestamp `hours` after an arbitrary epoch.
pub(crate) fn at(hours: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(i64::from(hours))
}

impl FakeRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a linux/amd64 image under `tag`, created `hours` after the epoch.
    pub(crate) fn with_image(self, tag: &str, digest: &str, hours: u32) -> Self {
        self.with_platform_image(tag, digest, hours, "linux/amd64")
    }

    pub(crate) fn with_platform_image(
        mut self,
        tag: &str,
        digest: &str,
        hours: u32,
        platform: &str,
    ) -> Self {
        self.tags.push(tag.to_string());
        self.images.insert(
            tag.to_string(),
            (
                Artifact::new(digest).with_created_at(Some(at(hours))),
                PlatformConstraint::parse(platform).unwrap(),
            ),
        );
        self
    }

    /// Adds a tag with no image behind it.
    pub(crate) fn with_dangling_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Makes lookups of `tag` fail.
    pub(crate) fn with_failing_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self.failing.insert(tag.to_string());
        self
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn into_arc(self) -> Arc<dyn Repository> {
        Arc::new(self)
    }
}

#[async_trait]
impl Repository for FakeRepository {
    async fn tags(&self) -> Result<Vec<String>> {
        Ok(self.tags.clone())
    }

    async fn artifact_by_tag(
        &self,
        tag: &str,
        platform: Option<&PlatformConstraint>,
    ) -> Result<Option<Artifact>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(tag) {
            return Err(ImageError::ManifestFetchFailed {
                reference: tag.to_string(),
                reason: "500 Internal Server Error".to_string(),
            });
        }

        Ok(self.images.get(tag).and_then(|(artifact, image_platform)| {
            platform
                .is_none_or(|p| p == image_platform)
                .then(|| artifact.clone().with_tag(tag))
        }))
    }

    async fn artifact_by_digest(
        &self,
        digest: &str,
        platform: Option<&PlatformConstraint>,
    ) -> Result<Option<Artifact>> {
        Ok(self
            .images
            .values()
            .find(|(artifact, image_platform)| {
                artifact.digest == digest && platform.is_none_or(|p| p == image_platform)
            })
            .map(|(artifact, _)| artifact.clone()))
    }
}
