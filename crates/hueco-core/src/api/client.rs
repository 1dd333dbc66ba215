//! API client for communicating with the HuecoApp REST backend.
//!
//! Every call goes through [`ApiClient::execute`], which attaches the bearer
//! token, consults the refresh coordinator on 401, and backs off on 429.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::{BearerAuthenticator, RefreshCoordinator, TokenStore};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP connect and request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the HuecoApp backend.
/// Clone is cheap - reqwest::Client and the auth pieces are shared.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) client: Client,
    base_url: String,
    pub(crate) store: Arc<TokenStore>,
    authenticator: BearerAuthenticator,
    coordinator: Arc<RefreshCoordinator>,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a client for `base_url` that reads and refreshes tokens in `store`.
    pub fn new(base_url: &str, store: Arc<TokenStore>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let coordinator = RefreshCoordinator::new(store.clone(), base_url)
            .context("Failed to create refresh client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authenticator: BearerAuthenticator::new(store.clone()),
            store,
            coordinator: Arc::new(coordinator),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first 429 backoff delay. Later delays keep doubling.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request to `path` on the backend.
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Send `request` through the authenticated pipeline.
    ///
    /// The response is returned as is once the pipeline is done with it: a
    /// final 401 means refresh was impossible or already tried, and the
    /// session has been cleared if it failed.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let mut request = self.authenticator.authorize(request).await;
        let mut unauthorized = 0;
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let replay = request.try_clone();
            let method = request.method().clone();
            let url = request.url().clone();
            debug!(method = %method, url = %url, "Sending request");

            let response = self
                .client
                .execute(request)
                .await
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            match response.status() {
                StatusCode::UNAUTHORIZED => {
                    unauthorized += 1;
                    let Some(rejected) = replay else {
                        return Ok(response);
                    };
                    match self.coordinator.authenticate(&rejected, unauthorized).await {
                        Some(retry) => request = retry,
                        None => return Ok(response),
                    }
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    retries += 1;
                    let Some(next) = replay.filter(|_| retries <= MAX_RATE_LIMIT_RETRIES) else {
                        return Ok(response);
                    };
                    warn!(
                        url = %url,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2; // Exponential backoff
                    request = next;
                }
                _ => return Ok(response),
            }
        }
    }

    /// Check if response is successful, returning an error with body if not.
    pub(crate) async fn check_response(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let url = request.url().clone();
        let response = self.execute(request).await?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.request(Method::GET, path).build()?;
        self.send_json(request).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.request(Method::POST, path).json(body).build()?;
        self.send_json(request).await
    }
}
