//! Selection by image creation time.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{cancellable, fetch_tags, SelectionStrategy, Selector, TagFilter};
use crate::artifact::Artifact;
use crate::error::Result;
use crate::fetcher::FetchLimiter;
use crate::platform::PlatformConstraint;
use crate::repository::Repository;

/// Ranks images by when they were built, newest first.
///
/// Creation time lives in each image's config, so every candidate tag has
/// to be resolved before anything can be ranked. This is the most
/// expensive strategy by far; narrow it with an allow pattern.
pub struct NewestBuildSelector {
    repo: Arc<dyn Repository>,
    fetcher: FetchLimiter,
    filter: TagFilter,
    platform: Option<PlatformConstraint>,
    limit: usize,
}

impl NewestBuildSelector {
    /// Creates a newest-build selector returning at most `limit` artifacts
    /// (zero for all).
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
        }
    }
}

/// Newest first. Images without a creation time sort last; ties go to the
/// lexically greater tag.
fn newest_first(a: &Artifact, b: &Artifact) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.tag.cmp(&a.tag))
}

#[async_trait]
impl Selector for NewestBuildSelector {
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Artifact>> {
        cancellable(cancel, SelectionStrategy::NewestBuild, async {
            let tags = self.filter.apply(self.repo.tags().await?);
            tracing::debug!(candidates = tags.len(), "Resolving every candidate tag");

            let mut artifacts =
                fetch_tags(&self.repo, &self.fetcher, cancel, tags, self.platform.as_ref())
                    .await?;
            artifacts.sort_by(newest_first);
            if self.limit > 0 {
                artifacts.truncate(self.limit);
            }
            Ok(artifacts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageError;
    use crate::selector::testing::{at, FakeRepository};

    fn selector(repo: FakeRepository, limit: usize) -> NewestBuildSelector {
        NewestBuildSelector::new(
            repo.into_arc(),
            FetchLimiter::new(4),
            TagFilter::default(),
            None,
            limit,
        )
    }

    fn tags(artifacts: &[Artifact]) -> Vec<&str> {
        artifacts.iter().filter_map(|a| a.tag.as_deref()).collect()
    }

    #[tokio::test]
    async fn test_orders_by_creation_time() {
        let repo = FakeRepository::new()
            .with_image("zzz", "sha256:old", 1)
            .with_image("aaa", "sha256:new", 9)
            .with_image("mmm", "sha256:mid", 5);

        let artifacts = selector(repo, 0)
            .select(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tags(&artifacts), vec!["aaa", "mmm", "zzz"]);
        assert_eq!(artifacts[0].created_at, Some(at(9)));
    }

    #[tokio::test]
    async fn test_equal_times_prefer_greater_tag() {
        let repo = FakeRepository::new()
            .with_image("a-tag", "sha256:same", 3)
            .with_image("b-tag", "sha256:same", 3);

        let artifacts = selector(repo, 0)
            .select(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tags(&artifacts), vec!["b-tag", "a-tag"]);
    }

    #[test]
    fn test_missing_creation_time_sorts_last() {
        let dated = Artifact::new("sha256:a")
            .with_tag("a")
            .with_created_at(Some(at(0)));
        let undated = Artifact::new("sha256:z").with_tag("z");
        assert_eq!(newest_first(&dated, &undated), Ordering::Less);
    }

    #[tokio::test]
    async fn test_limit_applies_after_ranking() {
        let repo = FakeRepository::new()
            .with_image("a", "sha256:a", 1)
            .with_image("b", "sha256:b", 7)
            .with_image("c", "sha256:c", 4);

        let artifacts = selector(repo, 2)
            .select(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tags(&artifacts), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_every_candidate_is_resolved() {
        let repo = Arc::new(
            FakeRepository::new()
                .with_image("a", "sha256:a", 1)
                .with_image("b", "sha256:b", 2)
                .with_dangling_tag("c"),
        );
        let selector = NewestBuildSelector::new(
            Arc::clone(&repo) as Arc<dyn Repository>,
            FetchLimiter::new(4),
            TagFilter::default(),
            None,
            1,
        );

        let artifacts = selector.select(&CancellationToken::new()).await.unwrap();
        assert_eq!(tags(&artifacts), vec!["b"]);
        assert_eq!(repo.lookups(), 3);
    }

    #[tokio::test]
    async fn test_any_failed_lookup_fails_selection() {
        let repo = FakeRepository::new()
            .with_image("a", "sha256:a", 1)
            .with_failing_tag("broken")
            .with_image("b", "sha256:b", 2);

        let err = selector(repo, 0)
            .select(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(&err, ImageError::FetchFailed { reference, .. } if reference == "broken"));
    }

    #[tokio::test]
    async fn test_platform_filter() {
        let repo = FakeRepository::new()
            .with_platform_image("arm", "sha256:arm", 9, "linux/arm64")
            .with_image("amd", "sha256:amd", 1);
        let selector = NewestBuildSelector::new(
            repo.into_arc(),
            FetchLimiter::new(4),
            TagFilter::default(),
            PlatformConstraint::parse("linux/amd64").ok(),
            0,
        );

        let artifacts = selector.select(&CancellationToken::new()).await.unwrap();
        assert_eq!(tags(&artifacts), vec!["amd"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = selector(FakeRepository::new().with_image("a", "sha256:a", 1), 0)
            .select(&cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::Cancelled));
    }
}
