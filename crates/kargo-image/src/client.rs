//! Distribution API client for a single repository.
//!
//! The client is cheap to build and holds no state of its own beyond the
//! negotiated credentials; caches and rate limits live on the shared
//! [`Registry`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LINK};
use reqwest::StatusCode;
use url::Url;

use crate::artifact::Artifact;
use crate::auth::{Authorizer, Challenge, Credentials};
use crate::cache::DigestCache;
use crate::directory::{parse_repository_url, Registry, RegistryDirectory, RepositoryRef};
use crate::error::{ImageError, Result};
use crate::media_type;
use crate::extract;
use crate::oci::{ErrorResponse, ImageIndex, Manifest, TagList};
use crate::platform::PlatformConstraint;
use crate::repository::Repository;
use crate::transport::RateLimitedTransport;

/// Client for the tags and manifests of one repository.
#[derive(Debug)]
pub struct RepositoryClient {
    registry: Arc<Registry>,
    repository: RepositoryRef,
    transport: RateLimitedTransport,
    authorizer: Authorizer,
}

impl RepositoryClient {
    /// Connects to a repository.
    ///
    /// Parses the URL, looks up the registry in the directory and probes the
    /// registry once to learn how to authenticate. `None` credentials mean
    /// anonymous access.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidReference`] for a malformed URL, and
    /// [`ImageError::RegistryUnreachable`] or
    /// [`ImageError::ChallengeNegotiationFailed`] if the probe fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use kargo_image::{DirectoryConfig, RegistryDirectory, Repository, RepositoryClient};
    ///
    /// # async fn example() -> kargo_image::Result<()> {
    /// let directory = RegistryDirectory::new(DirectoryConfig::default());
    /// let client =
    ///     RepositoryClient::connect(&directory, "ghcr.io/akuity/kargo", None, reqwest::Client::new())
    ///         .await?;
    /// let tags = client.tags().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(
        directory: &RegistryDirectory,
        repo_url: &str,
        credentials: Option<Credentials>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let repository = parse_repository_url(repo_url, directory)?;
        let registry = directory.get(&repository.registry);
        let transport = RateLimitedTransport::new(http, registry.limiter());

        let challenge =
            Challenge::negotiate(&transport, registry.name(), registry.api_address()).await?;
        let authorizer = Authorizer::new(
            registry.name(),
            challenge,
            credentials,
            &repository.api_path,
            transport.clone(),
        );

        tracing::debug!(
            repository = %repository.normalized,
            registry = registry.name(),
            "Connected to repository"
        );

        Ok(Self {
            registry,
            repository,
            transport,
            authorizer,
        })
    }

    /// Returns the parsed repository reference.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryRef {
        &self.repository
    }

    /// Returns the registry this client talks to.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Fetches the manifest a tag points at, or `None` if the tag does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the manifest cannot be
    /// decoded.
    pub async fn manifest_by_tag(&self, tag: &str) -> Result<Option<Manifest>> {
        self.manifest(tag, &format!("{}:{tag}", self.repository.normalized))
            .await
    }

    /// Fetches a manifest by digest, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the manifest cannot be
    /// decoded.
    pub async fn manifest_by_digest(&self, digest: &str) -> Result<Option<Manifest>> {
        self.manifest(digest, &format!("{}@{digest}", self.repository.normalized))
            .await
    }

    /// Fetches a blob.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::BlobFetchFailed`] if the blob cannot be read.
    pub async fn blob(&self, digest: &str) -> Result<Vec<u8>> {
        let failed = |reason: String| ImageError::BlobFetchFailed {
            digest: digest.to_string(),
            reason,
        };

        let url = self.api_url(&format!("blobs/{digest}"));
        let response = self.get(&url, None, failed).await?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        if !status.is_success() {
            return Err(failed(ErrorResponse::describe(status, &body)));
        }
        Ok(body.to_vec())
    }

    fn api_url(&self, suffix: &str) -> String {
        format!(
            "{}/v2/{}/{suffix}",
            self.registry.api_address(),
            self.repository.api_path
        )
    }

    async fn manifest(&self, reference: &str, shown: &str) -> Result<Option<Manifest>> {
        let failed = |reason: String| ImageError::ManifestFetchFailed {
            reference: shown.to_string(),
            reason,
        };

        let url = self.api_url(&format!("manifests/{reference}"));
        let accept = media_type::accept_header();
        let response = self.get(&url, Some(&accept), failed).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(reference = shown, "Manifest not found");
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        if !status.is_success() {
            return Err(failed(ErrorResponse::describe(status, &body)));
        }

        Manifest::decode(content_type.as_deref(), &body, shown).map(Some)
    }

    /// Sends an authorized GET, retrying once with a fresh token if the
    /// registry rejects the one held.
    async fn get<F>(&self, url: &str, accept: Option<&str>, failed: F) -> Result<reqwest::Response>
    where
        F: Fn(String) -> ImageError + Send + Sync,
    {
        let mut retried = false;
        loop {
            let mut request = self.transport.http().get(url);
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            let request = self.authorizer.authorize(request).await?;

            let response = self
                .transport
                .send(request)
                .await
                .map_err(|e| failed(e.to_string()))?;

            if response.status() == StatusCode::UNAUTHORIZED
                && self.authorizer.uses_tokens()
                && !retried
            {
                tracing::debug!(url, "Registry token rejected, refreshing");
                self.authorizer.invalidate().await;
                retried = true;
                continue;
            }
            return Ok(response);
        }
    }

    async fn extract(
        &self,
        manifest: Manifest,
        platform: Option<&PlatformConstraint>,
    ) -> Result<Option<Artifact>> {
        match manifest {
            Manifest::LegacyV1 { digest, manifest } => {
                let config = extract::legacy_config(&manifest, &digest)?;
                extract::artifact_from_config(&config, digest, platform)
            }
            Manifest::V2 { digest, manifest } | Manifest::Oci { digest, manifest } => {
                let blob = self.blob(&manifest.config.digest).await?;
                let config = extract::image_config(&blob, &digest)?;
                extract::artifact_from_config(&config, digest, platform)
            }
            Manifest::ManifestList { digest, index } | Manifest::ImageIndex { digest, index } => {
                self.extract_collection(digest, &index, platform).await
            }
        }
    }

    async fn extract_collection(
        &self,
        digest: String,
        index: &ImageIndex,
        platform: Option<&PlatformConstraint>,
    ) -> Result<Option<Artifact>> {
        let children = extract::collection_children(index, &digest, platform)?;

        if let Some(platform) = platform {
            let Some(child) = children.into_iter().next() else {
                tracing::debug!(digest = %digest, %platform, "No manifest in list matches platform");
                return Ok(None);
            };
            return match self.artifact_by_digest(&child, Some(platform)).await? {
                Some(artifact) => Ok(Some(artifact)),
                None => Err(ImageError::NoMatchingPlatform {
                    digest: child,
                    platform: platform.to_string(),
                }),
            };
        }

        let resolved: Vec<Artifact> =
            try_join_all(children.iter().map(|child| self.artifact_by_digest(child, None)))
                .await?
                .into_iter()
                .flatten()
                .collect();
        Ok(extract::collection_artifact(digest, &resolved))
    }
}

#[async_trait]
impl Repository for RepositoryClient {
    async fn tags(&self) -> Result<Vec<String>> {
        let failed = |reason: String| ImageError::TagListingFailed {
            repository: self.repository.normalized.clone(),
            reason,
        };

        let mut url = Url::parse(&self.api_url("tags/list")).map_err(|e| failed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("n", &self.registry.page_size().to_string());

        let mut tags = Vec::new();
        let mut visited = HashSet::new();
        loop {
            let response = self.get(url.as_str(), None, failed).await?;
            let status = response.status();
            let next = next_page(response.headers(), &url);
            let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;
            if !status.is_success() {
                return Err(failed(ErrorResponse::describe(status, &body)));
            }

            let page: TagList = serde_json::from_slice(&body).map_err(|e| failed(e.to_string()))?;
            tags.extend(page.tags.unwrap_or_default());

            visited.insert(url.clone());
            match next {
                Some(next) if visited.contains(&next) => {
                    tracing::warn!(url = %next, "Tag pages link in a cycle, stopping pagination");
                    break;
                }
                Some(next) => url = next,
                None => break,
            }
        }

        tracing::debug!(
            repository = %self.repository.normalized,
            count = tags.len(),
            "Listed tags"
        );
        Ok(tags)
    }

    async fn artifact_by_tag(
        &self,
        tag: &str,
        platform: Option<&PlatformConstraint>,
    ) -> Result<Option<Artifact>> {
        let Some(manifest) = self.manifest_by_tag(tag).await? else {
            return Ok(None);
        };
        Ok(self
            .extract(manifest, platform)
            .await?
            .map(|artifact| artifact.with_tag(tag)))
    }

    async fn artifact_by_digest(
        &self,
        digest: &str,
        platform: Option<&PlatformConstraint>,
    ) -> Result<Option<Artifact>> {
        let key = DigestCache::key(digest, platform);
        if let Some(artifact) = self.registry.cache().get(&key) {
            return Ok(Some(artifact));
        }

        let Some(manifest) = self.manifest_by_digest(digest).await? else {
            return Ok(None);
        };
        let artifact = self.extract(manifest, platform).await?;
        if let Some(artifact) = &artifact {
            self.registry.cache().put(key, artifact.clone());
        }
        Ok(artifact)
    }
}

/// Returns the `rel="next"` target of a `Link` header, resolved against the
/// current page URL.
fn next_page(headers: &reqwest::header::HeaderMap, current: &Url) -> Option<Url> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find_map(|link| {
            let (target, params) = link.split_once(';')?;
            let is_next = params.split(';').any(|p| {
                p.trim()
                    .strip_prefix("rel=")
                    .is_some_and(|rel| rel.trim_matches('"') == "next")
            });
            if !is_next {
                return None;
            }
            let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
            current.join(target).ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn headers(link: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LINK, HeaderValue::from_str(link).unwrap());
        headers
    }

    #[test]
    fn test_next_page_relative() {
        let current = Url::parse("https://ghcr.io/v2/a/b/tags/list?n=100").unwrap();
        let next = next_page(
            &headers(r#"</v2/a/b/tags/list?last=v1.2&n=100>; rel="next""#),
            &current,
        )
        .unwrap();
        assert_eq!(next.as_str(), "https://ghcr.io/v2/a/b/tags/list?last=v1.2&n=100");
    }

    #[test]
    fn test_next_page_absolute_and_unquoted() {
        let current = Url::parse("http://localhost:5000/v2/a/tags/list?n=2").unwrap();
        let next = next_page(
            &headers("<http://localhost:5000/v2/a/tags/list?last=b&n=2>; rel=next"),
            &current,
        )
        .unwrap();
        assert_eq!(next.query(), Some("last=b&n=2"));
    }

    #[test]
    fn test_next_page_ignores_other_relations() {
        let current = Url::parse("https://ghcr.io/v2/a/tags/list").unwrap();
        assert!(next_page(&headers(r#"</v2/a/tags/list?last=z>; rel="prev""#), &current).is_none());
        assert!(next_page(&HeaderMap::new(), &current).is_none());
    }
}
