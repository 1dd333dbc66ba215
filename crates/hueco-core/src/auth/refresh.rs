//! Transparent access-token refresh after a 401.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::header;
use reqwest::{Client, Request};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::authenticator::{bearer_header, bearer_token};
use super::{RefreshError, TokenStore};

/// Token refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "/api/auth/refresh";

/// Connect and overall timeout for the refresh exchange, matching the API client.
const REFRESH_TIMEOUT_SECS: u64 = 30;

/// Length of a 401 chain at which the session is given up on.
/// The first 401 (length 1) earns one refresh and one retry; a 401 on that
/// retry (length 2) means the backend will not accept us.
const MAX_RESPONSE_CHAIN: usize = 2;

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Exchanges the refresh token for a new access token when a request is
/// rejected, and rebuilds the request for a single retry.
///
/// Refreshes are serialized: when several requests fail together, the first
/// performs the exchange and the rest retry with the token it stored.
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    /// Separate from the API client so the exchange is never itself
    /// authorized, logged, or intercepted.
    client: Client,
    refresh_url: String,
    in_flight: Mutex<()>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<TokenStore>, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(REFRESH_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REFRESH_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            store,
            client,
            refresh_url: format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH),
            in_flight: Mutex::new(()),
        })
    }

    /// Decide what to do about a request the server answered with 401.
    ///
    /// `response_count` is the number of 401s in this call's chain,
    /// including the one being handled. Returns the request to send again,
    /// or `None` to let the 401 stand.
    pub async fn authenticate(&self, rejected: &Request, response_count: usize) -> Option<Request> {
        if !rejected.headers().contains_key(header::AUTHORIZATION) {
            debug!(url = %rejected.url(), "401 on an anonymous request, not refreshing");
            return None;
        }

        if response_count >= MAX_RESPONSE_CHAIN {
            warn!(
                url = %rejected.url(),
                response_count,
                "Still unauthorized after refresh, ending session"
            );
            self.end_session().await;
            return None;
        }

        let _guard = self.in_flight.lock().await;

        // Someone else refreshed while this request was in flight
        if let Some(current) = self
            .store
            .access_token()
            .await
            .filter(|token| !token.trim().is_empty())
        {
            if bearer_token(rejected) != Some(current.as_str()) {
                debug!(url = %rejected.url(), "Token already refreshed, retrying");
                return rebuild(rejected, &current);
            }
        }

        let Some(refresh) = self.store.refresh_token().await else {
            debug!("No refresh token, not refreshing");
            return None;
        };

        match self.exchange(&refresh).await {
            Ok(access) => {
                info!("Access token refreshed");
                rebuild(rejected, &access)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.end_session().await;
                None
            }
        }
    }

    /// Trade the refresh token for a new access token and store it.
    /// The refresh token itself is left as is.
    async fn exchange(&self, refresh: &str) -> Result<String, RefreshError> {
        let response = self
            .client
            .post(&self.refresh_url)
            .json(&RefreshRequest { refresh })
            .send()
            .await
            .map_err(RefreshError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected(status));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        if body.access.trim().is_empty() {
            return Err(RefreshError::InvalidResponse("empty access token".to_string()));
        }

        self.store.save(Some(&body.access), None).await?;
        Ok(body.access)
    }

    async fn end_session(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear stored tokens");
        }
    }
}

/// Copy `request` with `token` as its bearer credential.
fn rebuild(request: &Request, token: &str) -> Option<Request> {
    let Some(mut retry) = request.try_clone() else {
        warn!(url = %request.url(), "Request body cannot be replayed, not retrying");
        return None;
    };

    match bearer_header(token) {
        Ok(value) => {
            retry.headers_mut().insert(header::AUTHORIZATION, value);
            Some(retry)
        }
        Err(_) => {
            warn!("Refreshed token is not a valid header value, not retrying");
            None
        }
    }
}
