//! Per-registry request rate limiting.
//!
//! Requests are spaced evenly: each `take` reserves the next free slot and
//! waits until it arrives. Slots are handed out in call order.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// A blocking requests-per-second limiter.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting `requests_per_second` requests.
    ///
    /// A limit of zero disables limiting.
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        let interval = if requests_per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / requests_per_second
        };
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Returns the spacing enforced between requests.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the caller may issue one request.
    pub async fn take(&self) {
        if self.interval.is_zero() {
            return;
        }

        let now = Instant::now();
        let slot = {
            let mut next = self.next_slot.lock();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot
        };

        if slot > now {
            tokio::time::sleep_until(slot).await;
        }
    }
}
