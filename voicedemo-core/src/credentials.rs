//! Voice credential retrieval and client initialization
//!
//! The credential comes either from configuration (a key baked into the
//! deployment) or from a same-origin token endpoint:
//!
//! ```text
//! POST /.netlify/functions/get-vapi-token     (no body)
//! 200 {"apiKey": "..."}
//! 4xx  misconfiguration  -> fail immediately
//! 5xx  service down      -> retry with backoff
//! ```

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;

use crate::config::CredentialsConfig;
use crate::error::{Error, Result};
use crate::voice::{VoiceClientFactory, VoiceConnection};

/// Response from the token endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    api_key: String,
}

/// Exponential backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CredentialsConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before retry number `retry` (1-based), doubling and capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        self.initial_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure during {}, retrying",
                        what
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Where the voice credential comes from
#[derive(Debug, Clone)]
pub enum CredentialProvider {
    /// Key from configuration
    Static(String),
    /// Token endpoint
    Endpoint(TokenEndpoint),
}

impl CredentialProvider {
    /// Pick the configured source; a static key wins
    pub fn from_config(config: &CredentialsConfig) -> Result<Self> {
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(CredentialProvider::Static(key.to_string()));
        }
        if let Some(url) = &config.token_endpoint {
            return Ok(CredentialProvider::Endpoint(TokenEndpoint::new(
                url,
                Duration::from_secs(config.timeout_secs),
            )?));
        }
        Err(Error::Config(
            "either credentials.api_key or credentials.token_endpoint is required".to_string(),
        ))
    }

    /// Obtain the credential once
    pub async fn fetch(&self) -> Result<String> {
        match self {
            CredentialProvider::Static(key) => Ok(key.clone()),
            CredentialProvider::Endpoint(endpoint) => endpoint.fetch().await,
        }
    }
}

/// HTTP client for the token endpoint
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    url: String,
    http_client: reqwest::Client,
}

impl TokenEndpoint {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST with no body and read `apiKey` from the response
    pub async fn fetch(&self) -> Result<String> {
        let response = self
            .http_client
            .post(&self.url)
            .send()
            .await
            .map_err(|e| Error::Credentials {
                status: None,
                message: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();

        if status.is_success() {
            let token: TokenResponse = response.json().await.map_err(|e| Error::Credentials {
                status: Some(status.as_u16()),
                message: format!("failed to parse response: {}", e),
            })?;
            if token.api_key.trim().is_empty() {
                return Err(Error::Credentials {
                    status: Some(status.as_u16()),
                    message: "token endpoint returned an empty apiKey".to_string(),
                });
            }
            Ok(token.api_key)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Credentials {
                status: Some(status.as_u16()),
                message: error_text,
            })
        }
    }
}

/// Fetch a credential and build the voice client, retrying transient failures.
///
/// Both steps share one retry budget. The returned error is the last one seen;
/// a manual retry is another call to this function.
pub async fn initialize(
    provider: &CredentialProvider,
    factory: &dyn VoiceClientFactory,
    policy: &RetryPolicy,
) -> Result<VoiceConnection> {
    let connection = policy
        .run("voice initialization", move || async move {
            let api_key = provider.fetch().await?;
            factory.connect(&api_key)
        })
        .await?;
    tracing::info!("Voice client initialized");
    Ok(connection)
}
