//! Login endpoints. These issue a new token pair and start a session.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ApiClient;

const LOGIN_PATH: &str = "/api/auth/login";
const GOOGLE_LOGIN_PATH: &str = "/api/auth/google";
const FACEBOOK_LOGIN_PATH: &str = "/api/auth/facebook";

#[derive(Debug, Serialize)]
struct PasswordLogin<'a> {
    email: &'a str,
    password: &'a str,
}

/// Body for provider logins: the token the provider's SDK handed the app.
#[derive(Debug, Serialize)]
struct ProviderLogin<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct TokenPair {
    access: String,
    refresh: String,
}

impl ApiClient {
    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        self.issue_tokens(LOGIN_PATH, &PasswordLogin { email, password }, "password")
            .await
    }

    /// Sign in with a Google ID token obtained on the device.
    pub async fn login_with_google(&self, id_token: &str) -> Result<()> {
        self.issue_tokens(GOOGLE_LOGIN_PATH, &ProviderLogin { token: id_token }, "google")
            .await
    }

    /// Sign in with a Facebook access token obtained on the device.
    pub async fn login_with_facebook(&self, access_token: &str) -> Result<()> {
        self.issue_tokens(FACEBOOK_LOGIN_PATH, &ProviderLogin { token: access_token }, "facebook")
            .await
    }

    /// Post credentials to a login endpoint and save the issued pair.
    ///
    /// Sent on the bare client: a stale token must not ride along, and a 401
    /// here means bad credentials, not an expired session.
    async fn issue_tokens<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        method: &'static str,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .context("Failed to send login request")?;

        let response = Self::check_response(response).await?;

        let pair: TokenPair = response
            .json()
            .await
            .context("Failed to parse login response")?;

        self.store
            .save(Some(&pair.access), Some(&pair.refresh))
            .await
            .context("Failed to save session tokens")?;

        info!(method, "Logged in");
        Ok(())
    }
}
