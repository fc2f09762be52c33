//! Registry authentication: challenge discovery and token exchange.
//!
//! A registry advertises how it wants to be authenticated through the
//! `WWW-Authenticate` header of an unauthenticated `GET /v2/`. Basic
//! challenges are answered with the caller's credentials directly. Bearer
//! challenges are answered by exchanging the credentials (or a cached
//! refresh token) for a short-lived token at the advertised realm.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http_auth::parser::ChallengeParser;
use http_auth::ChallengeRef;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{ImageError, Result};
use crate::oci::ErrorResponse;
use crate::transport::RateLimitedTransport;

/// Client identifier sent with token exchanges.
const CLIENT_ID: &str = "kargo";

/// Credentials used to access a registry.
///
/// An empty username and password mean anonymous access. Refresh tokens
/// handed out by token services are remembered per service so later
/// exchanges need not resend the password; clones share the same store.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Registry username.
    pub username: String,

    /// Registry password or access token.
    pub password: String,

    refresh_tokens: Arc<parking_lot::Mutex<HashMap<String, String>>>,
}

impl Credentials {
    /// Creates credentials for a username and password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            refresh_tokens: Arc::default(),
        }
    }

    /// Returns true if no username or password is set.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }

    /// Returns the refresh token cached for a token service.
    #[must_use]
    pub fn refresh_token(&self, service: &str) -> Option<String> {
        self.refresh_tokens.lock().get(service).cloned()
    }

    /// Caches a refresh token for a token service.
    pub fn set_refresh_token(&self, service: impl Into<String>, token: impl Into<String>) {
        self.refresh_tokens.lock().insert(service.into(), token.into());
    }

    fn forget_refresh_token(&self, service: &str) {
        self.refresh_tokens.lock().remove(service);
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// An authentication scheme advertised by a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// The registry accepted an unauthenticated request.
    Anonymous,

    /// HTTP basic authentication.
    Basic,

    /// Token authentication against an external realm.
    Bearer {
        /// Token endpoint URL.
        realm: String,
        /// Token service name.
        service: Option<String>,
    },
}

impl Challenge {
    /// Parses a `WWW-Authenticate` header value.
    ///
    /// Returns `None` for unrecognized schemes or a bearer challenge without
    /// a realm.
    ///
    /// # Examples
    ///
    /// ```
    /// use kargo_image::Challenge;
    ///
    /// let challenge = Challenge::parse(
    ///     r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io""#,
    /// );
    /// assert_eq!(
    ///     challenge,
    ///     Some(Challenge::Bearer {
    ///         realm: "https://auth.docker.io/token".to_string(),
    ///         service: Some("registry.docker.io".to_string()),
    ///     })
    /// );
    /// ```
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        ChallengeParser::new(header)
            .map_while(std::result::Result::ok)
            .find_map(|challenge| Self::from_challenge_ref(&challenge))
    }

    /// Maps one parsed challenge to a supported scheme. Parameters are read
    /// from that challenge only.
    fn from_challenge_ref(challenge: &ChallengeRef<'_>) -> Option<Self> {
        if challenge.scheme.eq_ignore_ascii_case("basic") {
            return Some(Self::Basic);
        }
        if !challenge.scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let param = |name: &str| {
            challenge
                .params
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.to_unescaped())
                .filter(|value| !value.is_empty())
        };
        Some(Self::Bearer {
            realm: param("realm")?,
            service: param("service"),
        })
    }

    /// Probes a registry's API root to learn its challenge.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::RegistryUnreachable`] if the probe fails or
    /// answers with anything but 200 or 401, and
    /// [`ImageError::ChallengeNegotiationFailed`] if a 401 carries no
    /// usable challenge.
    pub async fn negotiate(
        transport: &RateLimitedTransport,
        registry: &str,
        api_address: &str,
    ) -> Result<Self> {
        let url = format!("{api_address}/v2/");
        let unreachable = |reason: String| ImageError::RegistryUnreachable {
            registry: registry.to_string(),
            reason,
        };

        let response = transport
            .send(transport.http().get(&url))
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                tracing::debug!(registry, "Registry allows anonymous access");
                Ok(Self::Anonymous)
            }
            StatusCode::UNAUTHORIZED => {
                let header = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| ImageError::ChallengeNegotiationFailed {
                        registry: registry.to_string(),
                        reason: "401 response carried no WWW-Authenticate header".to_string(),
                    })?;

                let challenge =
                    Self::parse(header).ok_or_else(|| ImageError::ChallengeNegotiationFailed {
                        registry: registry.to_string(),
                        reason: format!("unsupported challenge '{header}'"),
                    })?;
                tracing::debug!(registry, ?challenge, "Negotiated registry challenge");
                Ok(challenge)
            }
            status => {
                let body = response.bytes().await.unwrap_or_default();
                Err(unreachable(format!(
                    "unexpected response from {url}: {}",
                    ErrorResponse::describe(status, &body)
                )))
            }
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Attaches authorization to requests for one repository.
#[derive(Debug)]
pub struct Authorizer {
    registry: String,
    challenge: Challenge,
    credentials: Credentials,
    scope: String,
    transport: RateLimitedTransport,
    token: tokio::sync::Mutex<Option<String>>,
}

impl Authorizer {
    /// Creates an authorizer for pulling `repository`.
    #[must_use]
    pub fn new(
        registry: impl Into<String>,
        challenge: Challenge,
        credentials: Option<Credentials>,
        repository: &str,
        transport: RateLimitedTransport,
    ) -> Self {
        Self {
            registry: registry.into(),
            challenge,
            credentials: credentials.unwrap_or_default(),
            scope: format!("repository:{repository}:pull"),
            transport,
            token: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns the negotiated challenge.
    #[must_use]
    pub const fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    /// Returns true if requests carry a token that can expire.
    #[must_use]
    pub const fn uses_tokens(&self) -> bool {
        matches!(self.challenge, Challenge::Bearer { .. })
    }

    /// Adds an `Authorization` header to a request, exchanging for a token
    /// first if none is held.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::AuthenticationFailed`] if the token exchange
    /// fails.
    pub async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match &self.challenge {
            Challenge::Anonymous => Ok(request),
            Challenge::Basic if self.credentials.is_anonymous() => Ok(request),
            Challenge::Basic => Ok(request.basic_auth(
                &self.credentials.username,
                Some(&self.credentials.password),
            )),
            Challenge::Bearer { realm, service } => {
                let mut token = self.token.lock().await;
                let token = match token.as_ref() {
                    Some(token) => token.clone(),
                    None => token.insert(self.exchange(realm, service.as_deref()).await?).clone(),
                };
                Ok(request.bearer_auth(token))
            }
        }
    }

    /// Drops the held token so the next request exchanges for a fresh one.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    async fn exchange(&self, realm: &str, service: Option<&str>) -> Result<String> {
        let service_key = service.unwrap_or(realm);

        if let Some(refresh_token) = self.credentials.refresh_token(service_key) {
            match self.exchange_refresh_token(realm, service, &refresh_token).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    tracing::debug!(registry = %self.registry, error = %e, "Refresh token rejected, falling back to credentials");
                    self.credentials.forget_refresh_token(service_key);
                }
            }
        }

        let mut query = vec![("scope", self.scope.as_str()), ("client_id", CLIENT_ID)];
        if let Some(service) = service {
            query.push(("service", service));
        }
        if !self.credentials.is_anonymous() {
            query.push(("offline_token", "true"));
        }

        let mut request = self.transport.http().get(realm).query(&query);
        if !self.credentials.is_anonymous() {
            request = request.basic_auth(&self.credentials.username, Some(&self.credentials.password));
        }

        tracing::debug!(registry = %self.registry, realm, scope = %self.scope, "Requesting registry token");
        let response = self.request_token(request).await?;
        if let Some(refresh_token) = response.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            self.credentials.set_refresh_token(service_key, refresh_token);
        }
        self.token_from(response)
    }

    async fn exchange_refresh_token(
        &self,
        realm: &str,
        service: Option<&str>,
        refresh_token: &str,
    ) -> Result<String> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("service", service.unwrap_or_default()),
            ("scope", self.scope.as_str()),
            ("client_id", CLIENT_ID),
        ];

        let response = self
            .request_token(self.transport.http().post(realm).form(&form))
            .await?;
        if let Some(rotated) = response.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            self.credentials
                .set_refresh_token(service.unwrap_or(realm), rotated);
        }
        self.token_from(response)
    }

    async fn request_token(&self, request: reqwest::RequestBuilder) -> Result<TokenResponse> {
        let failed = |reason: String| ImageError::AuthenticationFailed {
            registry: self.registry.clone(),
            reason,
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| failed(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| failed(format!("failed to read token response: {e}")))?;
        if !status.is_success() {
            return Err(failed(ErrorResponse::describe(status, &body)));
        }

        serde_json::from_slice(&body).map_err(|e| failed(format!("invalid token response: {e}")))
    }

    fn token_from(&self, response: TokenResponse) -> Result<String> {
        response
            .token
            .filter(|t| !t.is_empty())
            .or(response.access_token.filter(|t| !t.is_empty()))
            .ok_or_else(|| ImageError::AuthenticationFailed {
                registry: self.registry.clone(),
                reason: "token response carried no token".to_string(),
            })
    }
}
