//! Bounded concurrent metadata fetching.
//!
//! One [`FetchLimiter`] is shared by every selector in the process, so its
//! ceiling caps in-flight fetches across all registries at once. The
//! per-registry rate limiter remains the real throttle; the ceiling only
//! bounds how many fetches may be parked waiting on it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{ImageError, Result};

/// Process-wide cap on concurrent metadata fetches.
#[derive(Debug, Clone)]
pub struct FetchLimiter {
    semaphore: Arc<Semaphore>,
    ceiling: usize,
}

impl Default for FetchLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CEILING)
    }
}

impl FetchLimiter {
    /// Default number of concurrent fetches.
    pub const DEFAULT_CEILING: usize = 1000;

    /// Creates a limiter admitting `ceiling` concurrent fetches (at least one).
    #[must_use]
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(ceiling)),
            ceiling,
        }
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Returns the number of slots not currently held.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Runs `fetch` once per key, at most [`ceiling`](Self::ceiling) at a
    /// time across every caller of this limiter.
    ///
    /// Units returning `Ok(None)` are left out of the result, which is in no
    /// particular order. The first unit to fail cancels the rest; the batch
    /// then fails with that unit's error wrapped with its key. Cancelling
    /// `cancel` abandons the batch with [`ImageError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::FetchFailed`] for the first failed unit, or
    /// [`ImageError::Cancelled`].
    pub async fn fetch_all<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        keys: Vec<String>,
        mut fetch: F,
    ) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let batch = cancel.child_token();
        let mut units = JoinSet::new();
        let total = keys.len();

        for key in keys {
            let permit = tokio::select! {
                biased;
                () = batch.cancelled() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => {
                    permit.map_err(|_| ImageError::Cancelled)?
                }
            };

            let unit = fetch(key.clone());
            let token = batch.clone();
            units.spawn(async move {
                let _permit = permit;
                let outcome = tokio::select! {
                    biased;
                    () = token.cancelled() => Err(ImageError::Cancelled),
                    outcome = unit => outcome,
                };
                if outcome.is_err() {
                    token.cancel();
                }
                (key, outcome)
            });
        }

        let mut results = Vec::with_capacity(total);
        let mut first_error = None;
        while let Some(joined) = units.join_next().await {
            let (key, outcome) = match joined {
                Ok(unit) => unit,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => continue,
            };

            match outcome {
                Ok(Some(value)) => results.push(value),
                Ok(None) => {}
                Err(ImageError::Cancelled) => {}
                Err(e) => {
                    batch.cancel();
                    if first_error.is_none() {
                        tracing::debug!(key = %key, error = %e, "Metadata fetch failed, cancelling batch");
                        first_error = Some(e.for_reference(key));
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(ImageError::Cancelled);
        }
        Ok(results)
    }
}
