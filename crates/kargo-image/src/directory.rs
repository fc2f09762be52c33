//! Registry directory: per-host settings, caches and rate limiters.
//!
//! A [`Registry`] is created on first use of a host and reused for the
//! lifetime of the directory, so every client for that host shares one
//! cache and one rate limiter.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::DigestCache;
use crate::config::DirectoryConfig;
use crate::error::{ImageError, Result};
use crate::limiter::RateLimiter;

/// API endpoint of the default registry (Docker Hub).
pub const DOCKER_HUB_API: &str = "https://registry-1.docker.io";

/// Hosts that refer to the default registry.
const DOCKER_HUB_ALIASES: [&str; 3] = ["docker.io", "index.docker.io", "registry-1.docker.io"];

/// A registry host and the state shared by all clients that talk to it.
#[derive(Debug)]
pub struct Registry {
    prefix: String,
    name: String,
    api_address: String,
    default_namespace: Option<String>,
    page_size: usize,
    cache: DigestCache,
    limiter: Arc<RateLimiter>,
}

impl Registry {
    /// Returns the host prefix (empty for the default registry).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the base URL of the registry API, without a trailing slash.
    #[must_use]
    pub fn api_address(&self) -> &str {
        &self.api_address
    }

    /// Returns the namespace implied for single-segment image names.
    #[must_use]
    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Returns the number of tags requested per page.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the digest-keyed artifact cache.
    #[must_use]
    pub const fn cache(&self) -> &DigestCache {
        &self.cache
    }

    /// Returns the rate limiter shared by every request to this registry.
    #[must_use]
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Returns `(api_path, normalized_path)` for an image path.
    ///
    /// The API path always carries the default namespace; the normalized
    /// path omits it.
    fn normalize_path(&self, path: &str) -> (String, String) {
        match self.default_namespace.as_deref() {
            Some(ns) => {
                let stripped = path
                    .strip_prefix(ns)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .filter(|rest| !rest.contains('/'))
                    .unwrap_or(path);
                if stripped.contains('/') {
                    (stripped.to_string(), stripped.to_string())
                } else {
                    (format!("{ns}/{stripped}"), stripped.to_string())
                }
            }
            None => (path.to_string(), path.to_string()),
        }
    }
}

/// Settings applied to a host the directory knows about in advance.
struct WellKnown {
    name: &'static str,
    default_namespace: Option<&'static str>,
    page_size: Option<usize>,
    rate_limit: Option<u32>,
}

/// Returns the seeded settings for a host prefix, if any.
fn well_known(prefix: &str) -> Option<WellKnown> {
    match prefix {
        "" => Some(WellKnown {
            name: "Docker Hub",
            default_namespace: Some("library"),
            page_size: None,
            rate_limit: None,
        }),
        "ghcr.io" => Some(WellKnown {
            name: "GitHub Container Registry",
            default_namespace: None,
            page_size: Some(100),
            rate_limit: None,
        }),
        _ => None,
    }
}

/// Memoized map from registry host prefix to [`Registry`].
#[derive(Debug)]
pub struct RegistryDirectory {
    config: DirectoryConfig,
    registries: Mutex<HashMap<String, Arc<Registry>>>,
}

impl RegistryDirectory {
    /// Creates a directory seeded with the well-known registries.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let directory = Self {
            config,
            registries: Mutex::new(HashMap::new()),
        };
        {
            let mut registries = directory.registries.lock();
            for prefix in ["", "ghcr.io"] {
                registries.insert(prefix.to_string(), Arc::new(directory.build(prefix)));
            }
        }
        directory
    }

    /// Returns the directory configuration.
    #[must_use]
    pub const fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Returns the registry for a host prefix, creating it on first use.
    ///
    /// Docker Hub aliases resolve to the default (empty-prefix) registry.
    #[must_use]
    pub fn get(&self, prefix: &str) -> Arc<Registry> {
        let prefix = canonical_prefix(prefix);
        let mut registries = self.registries.lock();
        if let Some(registry) = registries.get(prefix) {
            return Arc::clone(registry);
        }

        let registry = Arc::new(self.build(prefix));
        tracing::debug!(
            registry = prefix,
            page_size = registry.page_size,
            interval_ms = u64::try_from(registry.limiter.interval().as_millis()).unwrap_or(u64::MAX),
            "Registered registry"
        );
        registries.insert(prefix.to_string(), Arc::clone(&registry));
        registry
    }

    /// Returns the host prefixes currently registered, sorted.
    #[must_use]
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.registries.lock().keys().cloned().collect();
        prefixes.sort();
        prefixes
    }

    fn build(&self, prefix: &str) -> Registry {
        let known = well_known(prefix);
        let rate_host = if prefix.is_empty() { "docker.io" } else { prefix };
        let rate_limit = self
            .config
            .rate_limit_for(rate_host, known.as_ref().and_then(|k| k.rate_limit));

        Registry {
            prefix: prefix.to_string(),
            name: known
                .as_ref()
                .map_or_else(|| prefix.to_string(), |k| k.name.to_string()),
            api_address: api_address(prefix),
            default_namespace: known
                .as_ref()
                .and_then(|k| k.default_namespace.map(ToString::to_string)),
            page_size: known
                .as_ref()
                .and_then(|k| k.page_size)
                .unwrap_or(self.config.default_page_size),
            cache: DigestCache::new(self.config.cache_ttl, self.config.cache_sweep_interval),
            limiter: Arc::new(RateLimiter::new(rate_limit)),
        }
    }
}

fn canonical_prefix(prefix: &str) -> &str {
    if DOCKER_HUB_ALIASES.contains(&prefix) {
        ""
    } else {
        prefix
    }
}

/// Returns the API base URL for a host prefix.
///
/// Local and loopback registries are reached over plain HTTP.
fn api_address(prefix: &str) -> String {
    if prefix.is_empty() {
        return DOCKER_HUB_API.to_string();
    }
    let scheme = if is_local_host(prefix) { "http" } else { "https" };
    format!("{scheme}://{prefix}")
}

fn is_local_host(prefix: &str) -> bool {
    let host = if let Some(rest) = prefix.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        prefix.rsplit_once(':').map_or(prefix, |(h, _)| h)
    };

    host == "localhost"
        || host.ends_with(".local")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// A repository URL split into its registry and image path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    /// Registry host prefix (empty for the default registry).
    pub registry: String,

    /// Image path as sent to the registry API.
    pub api_path: String,

    /// Repository URL with registry defaults removed.
    pub normalized: String,
}

/// Parses a repository URL of the form `[host[:port]/]namespace/name`.
///
/// # Examples
///
/// ```
/// use kargo_image::{RegistryDirectory, DirectoryConfig};
/// use kargo_image::directory::parse_repository_url;
///
/// let directory = RegistryDirectory::new(DirectoryConfig::default());
///
/// let repo = parse_repository_url("library/nginx", &directory).unwrap();
/// assert_eq!(repo.registry, "");
/// assert_eq!(repo.api_path, "library/nginx");
/// assert_eq!(repo.normalized, "nginx");
///
/// let repo = parse_repository_url("ghcr.io/akuity/kargo", &directory).unwrap();
/// assert_eq!(repo.registry, "ghcr.io");
/// assert_eq!(repo.api_path, "akuity/kargo");
/// assert_eq!(repo.normalized, "ghcr.io/akuity/kargo");
/// ```
///
/// # Errors
///
/// Returns [`ImageError::InvalidReference`] for empty URLs, empty path
/// segments, or URLs that carry a tag or digest.
pub fn parse_repository_url(url: &str, directory: &RegistryDirectory) -> Result<RepositoryRef> {
    let invalid = |reason: &str| ImageError::InvalidReference {
        reference: url.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(invalid("repository URL is empty"));
    }
    if trimmed.contains('@') {
        return Err(invalid("repository URL must not include a digest"));
    }

    let (host, path) = match trimmed.split_once('/') {
        Some((first, rest)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            (first, rest)
        }
        _ => ("", trimmed),
    };

    if path.split('/').any(str::is_empty) {
        return Err(invalid("repository path has an empty segment"));
    }
    if path.contains(':') {
        return Err(invalid("repository URL must not include a tag"));
    }
    if path.chars().any(char::is_uppercase) {
        return Err(invalid("repository path must be lowercase"));
    }

    let registry = directory.get(host);
    let (api_path, normalized_path) = registry.normalize_path(path);
    let normalized = if registry.prefix().is_empty() {
        normalized_path
    } else {
        format!("{}/{normalized_path}", registry.prefix())
    };

    Ok(RepositoryRef {
        registry: registry.prefix().to_string(),
        api_path,
        normalized,
    })
}
