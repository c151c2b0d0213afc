//! Two-legged OAuth token provider.
//!
//! [`TwoLeggedAuth`] exchanges the application's client credentials for
//! a bearer token and caches it until shortly before it expires. The
//! same token authorizes both the engine API and object storage.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

/// Tokens are refreshed this long before their reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer tokens for outgoing API calls.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a bearer token valid for at least the next request.
    async fn token(&self) -> Result<String, AuthError>;
}

/// Errors from the token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The token endpoint rejected the credentials or failed.
    #[error("Token endpoint error ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

/// Client-credentials token provider with an in-memory cache.
pub struct TwoLeggedAuth {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scopes: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TwoLeggedAuth {
    /// * `token_url` - full URL of the token endpoint.
    /// * `scopes`    - space-separated scope list.
    pub fn new(
        client: reqwest::Client,
        token_url: String,
        client_id: String,
        client_secret: String,
        scopes: String,
    ) -> Self {
        Self {
            client,
            token_url,
            client_id,
            client_secret,
            scopes,
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.scopes.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = token.expires_in, "Fetched access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait::async_trait]
impl TokenProvider for TwoLeggedAuth {
    async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.access_token.clone());
        }

        let token = self.fetch().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}
