//! Configuration for registry access.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ImageError, Result};

/// Environment variable naming per-registry rate-limit overrides.
///
/// The value is a comma-separated list of `host=requests_per_second`
/// entries, e.g. `ghcr.io=50,quay.io=10`.
pub const RATE_LIMITS_ENV: &str = "KARGO_REGISTRY_RATE_LIMITS";

/// Configuration for the registry directory.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Requests per second allowed against a registry without an override.
    pub default_rate_limit: u32,

    /// Per-host requests-per-second overrides.
    pub rate_limit_overrides: HashMap<String, u32>,

    /// Lifetime of a cached artifact.
    pub cache_ttl: Duration,

    /// How often expired cache entries are swept.
    pub cache_sweep_interval: Duration,

    /// Number of tags requested per page when listing tags.
    pub default_page_size: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            default_rate_limit: 20,
            rate_limit_overrides: HashMap::new(),
            cache_ttl: Duration::from_secs(30 * 60),
            cache_sweep_interval: Duration::from_secs(60 * 60),
            default_page_size: 1000,
        }
    }
}

impl DirectoryConfig {
    /// Creates a configuration with defaults and overrides read from
    /// [`RATE_LIMITS_ENV`].
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(RATE_LIMITS_ENV) {
            config.rate_limit_overrides = parse_rate_limits(&value)?;
        }
        Ok(config)
    }

    /// Sets the default requests-per-second limit.
    #[must_use]
    pub const fn with_default_rate_limit(mut self, rps: u32) -> Self {
        self.default_rate_limit = rps;
        self
    }

    /// Overrides the rate limit for one registry host.
    #[must_use]
    pub fn with_rate_limit(mut self, host: impl Into<String>, rps: u32) -> Self {
        self.rate_limit_overrides.insert(host.into(), rps);
        self
    }

    /// Sets the cache entry lifetime.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the default tag page size.
    #[must_use]
    pub const fn with_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Returns the rate limit that applies to a registry host.
    ///
    /// # Examples
    ///
    /// ```
    /// use kargo_image::DirectoryConfig;
    ///
    /// let config = DirectoryConfig::default().with_rate_limit("ghcr.io", 50);
    /// assert_eq!(config.rate_limit_for("ghcr.io", None), 50);
    /// assert_eq!(config.rate_limit_for("quay.io", None), 20);
    /// assert_eq!(config.rate_limit_for("quay.io", Some(5)), 5);
    /// ```
    #[must_use]
    pub fn rate_limit_for(&self, host: &str, well_known: Option<u32>) -> u32 {
        self.rate_limit_overrides
            .get(host)
            .copied()
            .or(well_known)
            .unwrap_or(self.default_rate_limit)
    }
}

/// Parses `host=rps[,host=rps...]` rate-limit overrides.
///
/// # Errors
///
/// Returns [`ImageError::InvalidConfig`] on an entry without `=`, with an
/// empty host, or with a non-numeric or zero limit.
pub fn parse_rate_limits(value: &str) -> Result<HashMap<String, u32>> {
    let mut limits = HashMap::new();

    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (host, rps) = entry
            .split_once('=')
            .ok_or_else(|| ImageError::InvalidConfig {
                reason: format!("rate limit entry '{entry}' must be host=rps"),
            })?;

        let host = host.trim();
        if host.is_empty() {
            return Err(ImageError::InvalidConfig {
                reason: format!("rate limit entry '{entry}' has an empty host"),
            });
        }

        let rps = rps
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|r| *r > 0)
            .ok_or_else(|| ImageError::InvalidConfig {
                reason: format!("rate limit entry '{entry}' must have a positive integer limit"),
            })?;

        limits.insert(host.to_string(), rps);
    }

    Ok(limits)
}

/// Configuration for the HTTP clients used to reach registries.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("kargo-image/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds an HTTP client, optionally skipping TLS verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn build_client(&self, insecure_skip_tls_verify: bool) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .danger_accept_invalid_certs(insecure_skip_tls_verify)
            .build()
            .map_err(|e| ImageError::InvalidConfig {
                reason: format!("failed to build HTTP client: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_config_defaults() {
        let config = DirectoryConfig::default();
        assert_eq!(config.default_rate_limit, 20);
        assert_eq!(config.cache_ttl, Duration::from_secs(1800));
        assert_eq!(config.cache_sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.default_page_size, 1000);
        assert!(config.rate_limit_overrides.is_empty());
    }

    #[test]
    fn test_rate_limit_precedence() {
        let config = DirectoryConfig::default()
            .with_default_rate_limit(10)
            .with_rate_limit("ghcr.io", 40);

        // Operator override beats the well-known default.
        assert_eq!(config.rate_limit_for("ghcr.io", Some(5)), 40);
        assert_eq!(config.rate_limit_for("quay.io", Some(5)), 5);
        assert_eq!(config.rate_limit_for("quay.io", None), 10);
    }

    #[test]
    fn test_parse_rate_limits() {
        let limits = parse_rate_limits("ghcr.io=50, quay.io=10,").unwrap();
        assert_eq!(limits.len(), 2);
        assert_eq!(limits["ghcr.io"], 50);
        assert_eq!(limits["quay.io"], 10);
    }

    #[test]
    fn test_parse_rate_limits_empty() {
        assert!(parse_rate_limits("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rate_limits_rejects_malformed() {
        for value in ["ghcr.io", "=10", "ghcr.io=fast", "ghcr.io=0"] {
            let err = parse_rate_limits(value).unwrap_err();
            assert!(err.is_configuration_error(), "{value}");
        }
    }

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("kargo-image/"));
    }

    #[test]
    fn test_build_client() {
        let config = HttpConfig::default().with_timeout(Duration::from_secs(5));
        assert!(config.build_client(false).is_ok());
        assert!(config.build_client(true).is_ok());
    }
}
