//! HTTP transport that throttles every request through a registry's limiter.

use std::sync::Arc;

use crate::limiter::RateLimiter;

/// An HTTP client bound to one registry's rate limiter.
///
/// Every request sent through the transport (challenge probes, token
/// exchanges, tag pages, manifests and blobs) first waits for a slot.
#[derive(Debug, Clone)]
pub struct RateLimitedTransport {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedTransport {
    /// Wraps an HTTP client with a rate limiter.
    #[must_use]
    pub const fn new(http: reqwest::Client, limiter: Arc<RateLimiter>) -> Self {
        Self { http, limiter }
    }

    /// Returns the underlying client for building requests.
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Waits for a rate-limit slot, then sends the request.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request cannot be sent.
    pub async fn execute(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.limiter.take().await;
        tracing::trace!(method = %request.method(), url = %request.url(), "Sending registry request");
        self.http.execute(request).await
    }

    /// Builds and sends a request.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request cannot be built or sent.
    pub async fn send(&self, builder: reqwest::RequestBuilder) -> reqwest::Result<reqwest::Response> {
        self.execute(builder.build()?).await
    }
}
