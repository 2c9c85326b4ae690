//! Access tokens for the REST clients.

use std::time::{Duration, Instant};

use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

/// Token endpoint of the instance metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Supplies OAuth bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` when requests go unauthenticated.
    async fn token(&self) -> anyhow::Result<Option<String>>;
}

/// No credentials; used against local emulators.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl TokenProvider for NoAuth {
    async fn token(&self) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Service-account tokens from the metadata server, cached until near expiry.
pub struct MetadataToken {
    http: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataToken {
    #[must_use]
    pub fn new() -> Self {
        Self::with_url(METADATA_TOKEN_URL)
    }

    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            cached: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<String> {
        self.cached
            .lock()
            .as_ref()
            .filter(|t| Instant::now() < t.refresh_at)
            .map(|t| t.value.clone())
    }
}

impl Default for MetadataToken {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for MetadataToken {
    async fn token(&self) -> anyhow::Result<Option<String>> {
        if let Some(token) = self.current() {
            return Ok(Some(token));
        }

        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("requesting token from metadata server")?;
        let response = super::ensure_success(response, "token request").await?;
        let fresh: TokenResponse = response.json().await.context("parsing token response")?;

        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(REFRESH_MARGIN);
        debug!(expires_in = fresh.expires_in, "refreshed access token");
        *self.cached.lock() = Some(CachedToken {
            value: fresh.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(Some(fresh.access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_auth_has_no_token() {
        assert_eq!(NoAuth.token().await.unwrap(), None);
    }

    #[test]
    fn cached_token_is_served_until_refresh_point() {
        let provider = MetadataToken::with_url("http://127.0.0.1:1/unused");
        *provider.cached.lock() = Some(CachedToken {
            value: "tok".to_string(),
            refresh_at: Instant::now() + Duration::from_secs(30),
        });
        assert_eq!(provider.current().as_deref(), Some("tok"));

        *provider.cached.lock() = Some(CachedToken {
            value: "old".to_string(),
            refresh_at: Instant::now().checked_sub(Duration::from_secs(1)).unwrap(),
        });
        assert_eq!(provider.current(), None);
    }
}
