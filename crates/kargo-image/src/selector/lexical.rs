//! Selection by descending lexical order of tag names.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{cancellable, resolve_ranked, SelectionStrategy, Selector, TagFilter};
use crate::artifact::Artifact;
use crate::error::Result;
use crate::fetcher::FetchLimiter;
use crate::platform::PlatformConstraint;
use crate::repository::Repository;

/// Ranks tags by name, greatest first.
///
/// Suited to tags carrying a sortable timestamp, where lexical order
/// follows build order.
pub struct LexicalSelector {
    repo: Arc<dyn Repository>,
    fetcher: FetchLimiter,
    filter: TagFilter,
    platform: Option<PlatformConstraint>,
    limit: usize,
}

impl LexicalSelector {
    /// Creates a lexical selector returning at most `limit` artifacts
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

/// Sorts tags into descending lexical order.
fn rank(tags: &mut [String]) {
    tags.sort_unstable_by(|a, b| b.cmp(a));
}

#[async_trait]
impl Selector for LexicalSelector {
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Artifact>> {
        cancellable(cancel, SelectionStrategy::Lexical, async {
            let mut tags = self.filter.apply(self.repo.tags().await?);
            rank(&mut tags);
            tracing::debug!(candidates = tags.len(), "Ranked tags lexically");

            resolve_ranked(
                &self.repo,
                &self.fetcher,
                cancel,
                &tags,
                self.platform.as_ref(),
                self.limit,
            )
            .await
        })
        .await
    }
}
