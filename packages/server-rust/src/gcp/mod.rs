//! Google Cloud REST clients for the collaborator traits.
//!
//! Every client shares one [`GcpClient`]: a pooled `reqwest` client plus a
//! [`TokenProvider`]. Emulator endpoints pair with [`NoAuth`].

pub mod auth;
pub mod bigquery;
pub mod pubsub;
pub mod storage;
pub mod translate;
pub mod vision;

use std::sync::Arc;

use anyhow::{bail, Context as _};
use reqwest::{Method, RequestBuilder, Response};

pub use auth::{MetadataToken, NoAuth, TokenProvider};
pub use bigquery::BigQueryClient;
pub use pubsub::PubSubPublisher;
pub use storage::GcsObjectStore;
pub use translate::TranslateClient;
pub use vision::VisionClient;

/// Authenticated HTTP access to one API endpoint.
#[derive(Clone)]
pub struct GcpClient {
    http: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
    base_url: String,
}

impl GcpClient {
    /// Calls carry no client-side deadline; publish drain is the only bounded wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn TokenProvider>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            auth,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Starts a request to `{base_url}{path}` carrying a bearer token when one
    /// is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be obtained.
    pub async fn request(&self, method: Method, path: &str) -> anyhow::Result<RequestBuilder> {
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        Ok(match self.auth.token().await? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }
}

/// Base URL for an emulator given as `host:port`.
#[must_use]
pub fn emulator_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Fails with the response body when the status is not a success.
///
/// # Errors
///
/// Returns an error carrying the status and body text for non-2xx responses.
pub async fn ensure_success(response: Response, what: &str) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{what} failed with status {status}: {body}")
}

/// Percent-encodes one URL path segment.
#[must_use]
pub fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
