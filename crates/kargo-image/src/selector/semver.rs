//! Selection by semantic version.

use std::sync::Arc;

use ::semver::Version;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{cancellable, resolve_ranked, SelectionStrategy, Selector, TagFilter};
use crate::artifact::Artifact;
use crate::error::Result;
use crate::fetcher::FetchLimiter;
use crate::platform::PlatformConstraint;
use crate::repository::Repository;
use crate::version::{compare_tagged, parse_tag, VersionConstraint};

/// Ranks tags by semantic version, highest first.
///
/// Tags that do not parse as versions are ignored. Ranking needs only the
/// tag names, so at most `limit` candidates are resolved per round.
pub struct SemVerSelector {
    repo: Arc<dyn Repository>,
    fetcher: FetchLimiter,
    filter: TagFilter,
    platform: Option<PlatformConstraint>,
    limit: usize,
    constraint: Option<VersionConstraint>,
    strict: bool,
}

impl SemVerSelector {
    /// Creates a semver selector returning at most `limit` artifacts (zero
    /// for all).
    #[must_use]
    pub fn new(
        repo: Arc<dyn Repository>,
        fetcher: FetchLimiter,
        filter: TagFilter,
        platform: Option<PlatformConstraint>,
        limit: usize,
    ) -> Self {
        Self {
            repo,
            fetcher,
            filter,
            platform,
            limit,
            constraint: None,
            strict: false,
        }
    }

    /// Restricts candidates to versions satisfying `constraint`.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Option<VersionConstraint>) -> Self {
        self.constraint = constraint;
        self
    }

    /// Requires tags to spell out all three version components.
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Returns the candidate tags, best first.
    fn rank(&self, tags: Vec<String>) -> Vec<String> {
        let mut versioned: Vec<(Version, String)> = self
            .filter
            .apply(tags)
            .into_iter()
            .filter_map(|tag| parse_tag(&tag, self.strict).map(|v| (v, tag)))
            .filter(|(v, _)| self.constraint.as_ref().is_none_or(|c| c.matches(v)))
            .collect();

        versioned.sort_by(|a, b| compare_tagged((&a.0, &a.1), (&b.0, &b.1)));
        versioned.into_iter().map(|(_, tag)| tag).collect()
    }
}

#[async_trait]
impl Selector for SemVerSelector {
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Artifact>> {
        cancellable(cancel, SelectionStrategy::SemVer, async {
            let ranked = self.rank(self.repo.tags().await?);
            tracing::debug!(
                candidates = ranked.len(),
                constraint = self.constraint.as_ref().map_or("", VersionConstraint::as_str),
                "Ranked tags by version"
            );

            resolve_ranked(
                &self.repo,
                &self.fetcher,
                cancel,
                &ranked,
                self.platform.as_ref(),
                self.limit,
            )
            .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::testing::FakeRepository;

    fn selector(repo: FakeRepository) -> SemVerSelector {
        SemVerSelector::new(
            repo.into_arc(),
            FetchLimiter::new(4),
            TagFilter::default(),
            None,
            0,
        )
    }

    fn tags(artifacts: &[Artifact]) -> Vec<&str> {
        artifacts.iter().filter_map(|a| a.tag.as_deref()).collect()
    }

    fn releases() -> FakeRepository {
        FakeRepository::new()
            .with_image("1.2.0", "sha256:120", 1)
            .with_image("v1.10.0", "sha256:1100", 2)
            .with_image("latest", "sha256:1100", 2)
            .with_image("2.0.0-rc.1", "sha256:200rc1", 3)
            .with_image("1.9", "sha256:190", 4)
    }

    #[tokio::test]
    async fn test_orders_by_precedence() {
        let artifacts = selector(releases())
            .select(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tags(&artifacts), vec!["2.0.0-rc.1", "v1.10.0", "1.9", "1.2.0"]);
        assert_eq!(artifacts[1].semver, Some(Version::new(1, 10, 0)));
    }

    #[tokio::test]
    async fn test_equal_versions_prefer_greater_tag() {
        let repo = FakeRepository::new()
            .with_image("1.0", "sha256:a", 1)
            .with_image("1.0.0", "sha256:b", 1);
        let artifacts = selector(repo)
            .select(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tags(&artifacts), vec!["1.0.0", "1.0"]);
    }

    #[tokio::test]
    async fn test_constraint_filters_candidates() {
        let selector = selector(releases())
            .with_constraint(VersionConstraint::parse("^1.2").ok());
        let artifacts = selector.select(&CancellationToken::new()).await.unwrap();
        assert_eq!(tags(&artifacts), vec!["v1.10.0", "1.9", "1.2.0"]);
    }

    #[tokio::test]
    async fn test_strict_requires_full_versions() {
        let artifacts = selector(releases())
            .strict(true)
            .select(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tags(&artifacts), vec!["2.0.0-rc.1", "v1.10.0", "1.2.0"]);
    }

    #[tokio::test]
    async fn test_limit_resolves_only_what_is_needed() {
        let repo = Arc::new(releases());
        let selector = SemVerSelector::new(
            Arc::clone(&repo) as Arc<dyn Repository>,
            FetchLimiter::new(4),
            TagFilter::default(),
            None,
            2,
        );

        let artifacts = selector.select(&CancellationToken::new()).await.unwrap();
        assert_eq!(tags(&artifacts), vec!["2.0.0-rc.1", "v1.10.0"]);
        assert_eq!(repo.lookups(), 2);
    }

    #[tokio::test]
    async fn test_no_versioned_tags_is_empty() {
        let repo = FakeRepository::new()
            .with_image("latest", "sha256:a", 1)
            .with_image("main", "sha256:b", 2);
        let artifacts = selector(repo)
            .select(&CancellationToken::new())
            .await
            .unwrap();
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_platform_without_match_is_empty() {
        let selector = SemVerSelector::new(
            releases().into_arc(),
            FetchLimiter::new(4),
            TagFilter::default(),
            PlatformConstraint::parse("linux/s390x").ok(),
            3,
        );
        assert!(selector.select(&CancellationToken::new()).await.unwrap().is_empty());
    }
}
