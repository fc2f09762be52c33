//! In-memory artifact cache keyed by digest.
//!
//! Digests are immutable, so an entry never needs invalidating before it
//! expires. Artifacts looked up by tag are never stored here.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::artifact::Artifact;
use crate::platform::PlatformConstraint;

/// A TTL cache of resolved artifacts.
#[derive(Debug)]
pub struct DigestCache {
    ttl: Duration,
    sweep_interval: Duration,
    state: Mutex<CacheState>,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    last_sweep: Instant,
}

#[derive(Debug)]
struct CacheEntry {
    artifact: Artifact,
    expires_at: Instant,
}

impl DigestCache {
    /// Creates a cache whose entries live for `ttl`, with expired entries
    /// swept every `sweep_interval`.
    #[must_use]
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            ttl,
            sweep_interval,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Builds the cache key for a digest resolved under a platform constraint.
    ///
    /// A manifest list resolves to a different artifact with and without a
    /// constraint, so the constraint is part of the key.
    #[must_use]
    pub fn key(digest: &str, platform: Option<&PlatformConstraint>) -> String {
        platform.map_or_else(|| digest.to_string(), |p| format!("{digest}@{p}"))
    }

    /// Returns a copy of the cached artifact, if present and unexpired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Artifact> {
        let mut state = self.state.lock();
        let now = Instant::now();

        match state.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                tracing::trace!(key, "Cache hit");
                Some(entry.artifact.clone())
            }
            Some(_) => {
                state.entries.remove(key);
                tracing::trace!(key, "Cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Stores an artifact.
    pub fn put(&self, key: impl Into<String>, artifact: Artifact) {
        let mut state = self.state.lock();
        let now = Instant::now();

        if now.duration_since(state.last_sweep) >= self.sweep_interval {
            let before = state.entries.len();
            state.entries.retain(|_, entry| entry.expires_at > now);
            state.last_sweep = now;
            tracing::debug!(
                removed = before - state.entries.len(),
                "Swept expired cache entries"
            );
        }

        state.entries.insert(
            key.into(),
            CacheEntry {
                artifact,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Returns the number of stored entries, including expired ones not yet
    /// swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> DigestCache {
        DigestCache::new(Duration::from_secs(30 * 60), Duration::from_secs(60 * 60))
    }

    #[test]
    fn test_key_includes_platform() {
        let platform = PlatformConstraint::parse("linux/arm64").unwrap();
        assert_eq!(DigestCache::key("sha256:abc", None), "sha256:abc");
        assert_eq!(
            DigestCache::key("sha256:abc", Some(&platform)),
            "sha256:abc@linux/arm64"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_clone() {
        let cache = cache();
        let artifact = Artifact::new("sha256:abc");
        cache.put("sha256:abc", artifact.clone());

        assert_eq!(cache.get("sha256:abc"), Some(artifact));
        assert_eq!(cache.get("sha256:def"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = cache();
        cache.put("sha256:abc", Artifact::new("sha256:abc"));

        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        assert!(cache.get("sha256:abc").is_some());

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert!(cache.get("sha256:abc").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_entries() {
        let cache = cache();
        cache.put("sha256:old", Artifact::new("sha256:old"));

        tokio::time::advance(Duration::from_secs(61 * 60)).await;
        cache.put("sha256:new", Artifact::new("sha256:new"));

        assert_eq!(cache.len(), 1);
        assert!(cache.get("sha256:new").is_some());
    }
}
