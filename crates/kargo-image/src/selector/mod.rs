//! Image selection strategies.
//!
//! A selector lists a repository's tags, ranks the candidates under its
//! strategy and resolves the best ones to [`Artifact`]s. An empty result
//! means "nothing to promote", never failure.
//!
//! | Strategy      | Candidates                         | Ranking                                  |
//! |---------------|------------------------------------|------------------------------------------|
//! | `Digest`      | the single tag named by constraint | none                                     |
//! | `Lexical`     | filtered tags                      | tag name, descending                     |
//! | `NewestBuild` | filtered tags                      | creation time, then tag name, descending |
//! | `SemVer`      | filtered tags parsing as versions  | version, then original tag, descending   |

mod digest;
mod filter;
mod lexical;
mod newest_build;
mod semver;
#[cfg(test)]
mod testing;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::artifact::Artifact;
use crate::auth::Credentials;
use crate::client::RepositoryClient;
use crate::config::HttpConfig;
use crate::directory::RegistryDirectory;
use crate::error::{ImageError, Result};
use crate::fetcher::FetchLimiter;
use crate::platform::PlatformConstraint;
use crate::repository::Repository;
use crate::version::VersionConstraint;

pub use self::digest::DigestSelector;
pub use self::filter::TagFilter;
pub use self::lexical::LexicalSelector;
pub use self::newest_build::NewestBuildSelector;
pub use self::semver::SemVerSelector;

/// Picks images from a repository.
#[async_trait]
pub trait Selector: Send + Sync {
    /// Returns the selected artifacts, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be queried or returns data
    /// that cannot be understood, or [`ImageError::Cancelled`] if `cancel`
    /// fires first.
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Artifact>>;
}

/// Image selection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectionStrategy {
    /// Exactly the tag named by the constraint.
    Digest,

    /// Tags in descending lexical order.
    Lexical,

    /// Tags ordered by image creation time, newest first.
    NewestBuild,

    /// Tags ordered by semantic version, highest first.
    #[default]
    SemVer,
}

impl SelectionStrategy {
    /// Every strategy, in declaration order.
    pub const ALL: [Self; 4] = [Self::Digest, Self::Lexical, Self::NewestBuild, Self::SemVer];

    /// Returns the strategy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Digest => "Digest",
            Self::Lexical => "Lexical",
            Self::NewestBuild => "NewestBuild",
            Self::SemVer => "SemVer",
        }
    }
}

impl FromStr for SelectionStrategy {
    type Err = ImageError;

    /// Parses a strategy name. The empty string selects [`Self::SemVer`].
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ImageError::UnknownStrategy {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options shared by all strategies. Each strategy reads only the fields
/// that concern it.
#[derive(Debug, Clone, Default)]
pub struct SelectorOptions {
    /// Tag name (`Digest`) or version range (`SemVer`).
    pub constraint: String,

    /// Pattern tags must match. Empty allows all tags.
    pub allow_regex: String,

    /// Tags never selected.
    pub ignore: Vec<String>,

    /// Platform (`os/arch[/variant]`) images must be built for. Empty
    /// accepts any platform.
    pub platform: String,

    /// Registry credentials. `None` means anonymous access.
    pub credentials: Option<Credentials>,

    /// Maximum number of artifacts returned. Zero means no limit.
    pub discovery_limit: usize,

    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: bool,

    /// Require `SemVer` tags to carry all three version components.
    pub strict_semvers: bool,
}

/// A validated selector configuration, not yet bound to a repository.
///
/// Validation needs no network access, so configuration errors surface
/// before any registry is contacted.
#[derive(Debug, Clone)]
pub struct SelectorPlan {
    strategy: SelectionStrategy,
    filter: TagFilter,
    platform: Option<PlatformConstraint>,
    limit: usize,
    tag: String,
    range: Option<VersionConstraint>,
    strict: bool,
}

impl SelectorPlan {
    /// Validates a strategy name and options.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::UnknownStrategy`], [`ImageError::InvalidRegex`],
    /// [`ImageError::InvalidPlatform`] or [`ImageError::InvalidConstraint`].
    pub fn new(strategy: &str, opts: &SelectorOptions) -> Result<Self> {
        let strategy: SelectionStrategy = strategy.parse()?;
        let filter = TagFilter::new(&opts.allow_regex, &opts.ignore)?;
        let platform = if opts.platform.is_empty() {
            None
        } else {
            Some(PlatformConstraint::parse(&opts.platform)?)
        };

        let constraint = opts.constraint.trim();
        let mut tag = String::new();
        let mut range = None;
        match strategy {
            SelectionStrategy::Digest => {
                if constraint.is_empty() {
                    return Err(ImageError::InvalidConstraint {
                        constraint: String::new(),
                        reason: "the Digest strategy requires a tag to track".to_string(),
                    });
                }
                tag = constraint.to_string();
            }
            SelectionStrategy::SemVer if !constraint.is_empty() => {
                range = Some(VersionConstraint::parse(constraint)?);
            }
            SelectionStrategy::Lexical
            | SelectionStrategy::NewestBuild
            | SelectionStrategy::SemVer => {}
        }

        Ok(Self {
            strategy,
            filter,
            platform,
            limit: opts.discovery_limit,
            tag,
            range,
            strict: opts.strict_semvers,
        })
    }

    /// Returns the chosen strategy.
    #[must_use]
    pub const fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Binds the plan to a repository.
    #[must_use]
    pub fn build(self, repo: Arc<dyn Repository>, fetcher: FetchLimiter) -> Box<dyn Selector> {
        match self.strategy {
            SelectionStrategy::Digest => {
                Box::new(DigestSelector::new(repo, self.tag, self.platform))
            }
            SelectionStrategy::Lexical => Box::new(LexicalSelector::new(
                repo,
                fetcher,
                self.filter,
                self.platform,
                self.limit,
            )),
            SelectionStrategy::NewestBuild => Box::new(NewestBuildSelector::new(
                repo,
                fetcher,
                self.filter,
                self.platform,
                self.limit,
            )),
            SelectionStrategy::SemVer => Box::new(
                SemVerSelector::new(repo, fetcher, self.filter, self.platform, self.limit)
                    .with_constraint(self.range)
                    .strict(self.strict),
            ),
        }
    }
}

/// Creates selectors bound to live registries.
///
/// The factory owns the process-wide services every selector shares: the
/// registry directory and the fetch limiter.
#[derive(Debug, Clone)]
pub struct SelectorFactory {
    directory: Arc<RegistryDirectory>,
    fetcher: FetchLimiter,
    http: reqwest::Client,
    insecure_http: reqwest::Client,
}

impl SelectorFactory {
    /// Creates a factory.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidConfig`] if the HTTP clients cannot be
    /// built.
    pub fn new(
        directory: Arc<RegistryDirectory>,
        fetcher: FetchLimiter,
        http: &HttpConfig,
    ) -> Result<Self> {
        Ok(Self {
            directory,
            fetcher,
            http: http.build_client(false)?,
            insecure_http: http.build_client(true)?,
        })
    }

    /// Returns the registry directory.
    #[must_use]
    pub fn directory(&self) -> &RegistryDirectory {
        &self.directory
    }

    /// Returns the shared fetch limiter.
    #[must_use]
    pub const fn fetcher(&self) -> &FetchLimiter {
        &self.fetcher
    }

    /// Creates a selector for a repository.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use kargo_image::{
    ///     DirectoryConfig, FetchLimiter, HttpConfig, RegistryDirectory, SelectorFactory,
    ///     SelectorOptions,
    /// };
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn example() -> kargo_image::Result<()> {
    /// let factory = SelectorFactory::new(
    ///     Arc::new(RegistryDirectory::new(DirectoryConfig::default())),
    ///     FetchLimiter::default(),
    ///     &HttpConfig::default(),
    /// )?;
    ///
    /// let opts = SelectorOptions {
    ///     constraint: "^1.0".to_string(),
    ///     discovery_limit: 5,
    ///     ..SelectorOptions::default()
    /// };
    /// let selector = factory.new_selector("nginx", "SemVer", opts).await?;
    /// let images = selector.select(&CancellationToken::new()).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid options, or the error
    /// raised while connecting to the registry.
    pub async fn new_selector(
        &self,
        repo_url: &str,
        strategy: &str,
        opts: SelectorOptions,
    ) -> Result<Box<dyn Selector>> {
        let plan = SelectorPlan::new(strategy, &opts)?;

        let http = if opts.insecure_skip_tls_verify {
            self.insecure_http.clone()
        } else {
            self.http.clone()
        };
        let client =
            RepositoryClient::connect(&self.directory, repo_url, opts.credentials, http).await?;

        tracing::debug!(
            repository = %client.repository().normalized,
            strategy = %plan.strategy(),
            "Created image selector"
        );
        Ok(plan.build(Arc::new(client), self.fetcher.clone()))
    }
}

/// Runs a selection, abandoning it if `cancel` fires.
pub(crate) async fn cancellable<F>(
    cancel: &CancellationToken,
    strategy: SelectionStrategy,
    selection: F,
) -> Result<Vec<Artifact>>
where
    F: Future<Output = Result<Vec<Artifact>>>,
{
    let selected = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ImageError::Cancelled),
        result = selection => result,
    }?;

    tracing::info!(%strategy, selected = selected.len(), "Image selection complete");
    Ok(selected)
}

/// Resolves ranked tags to artifacts, best first, until `limit` artifacts
/// are found or the candidates run out.
///
/// Candidates are fetched concurrently in windows no larger than the number
/// of artifacts still wanted. Tags that resolve to nothing (for instance an
/// image for another platform) are skipped.
pub(crate) async fn resolve_ranked(
    repo: &Arc<dyn Repository>,
    fetcher: &FetchLimiter,
    cancel: &CancellationToken,
    ranked: &[String],
    platform: Option<&PlatformConstraint>,
    limit: usize,
) -> Result<Vec<Artifact>> {
    let mut selected = Vec::new();
    let mut offset = 0;

    while offset < ranked.len() && (limit == 0 || selected.len() < limit) {
        let wanted = if limit == 0 {
            ranked.len()
        } else {
            limit - selected.len()
        };
        let window = &ranked[offset..ranked.len().min(offset + wanted)];
        offset += window.len();

        let rank: HashMap<&str, usize> = window
            .iter()
            .enumerate()
            .map(|(i, tag)| (tag.as_str(), i))
            .collect();

        let mut found = fetch_tags(repo, fetcher, cancel, window.to_vec(), platform).await?;
        found.sort_by_key(|artifact| {
            artifact
                .tag
                .as_deref()
                .and_then(|tag| rank.get(tag).copied())
                .unwrap_or(usize::MAX)
        });
        selected.extend(found);
    }

    Ok(selected)
}

/// Resolves tags concurrently through the fetch limiter.
pub(crate) async fn fetch_tags(
    repo: &Arc<dyn Repository>,
    fetcher: &FetchLimiter,
    cancel: &CancellationToken,
    tags: Vec<String>,
    platform: Option<&PlatformConstraint>,
) -> Result<Vec<Artifact>> {
    let platform = platform.cloned();
    fetcher
        .fetch_all(cancel, tags, |tag| {
            let repo = Arc::clone(repo);
            let platform = platform.clone();
            async move { repo.artifact_by_tag(&tag, platform.as_ref()).await }
        })
        .await
}
