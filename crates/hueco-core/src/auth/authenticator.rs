use std::sync::Arc;

use reqwest::header::{self, HeaderValue, InvalidHeaderValue};
use reqwest::Request;
use tracing::warn;

use super::TokenStore;

/// Attaches the current access token to outbound requests.
#[derive(Clone)]
pub struct BearerAuthenticator {
    store: Arc<TokenStore>,
}

impl BearerAuthenticator {
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self { store }
    }

    /// Set `Authorization: Bearer <access>` when a token is held.
    ///
    /// Never fails. Without a token the request goes out anonymously and the
    /// server's 401 is what reports it.
    pub async fn authorize(&self, mut request: Request) -> Request {
        let Some(token) = self
            .store
            .access_token()
            .await
            .filter(|token| !token.trim().is_empty())
        else {
            return request;
        };

        match bearer_header(&token) {
            Ok(value) => {
                request.headers_mut().insert(header::AUTHORIZATION, value);
            }
            Err(_) => warn!(
                url = %request.url(),
                "Access token is not a valid header value, sending without it"
            ),
        }
        request
    }
}

pub(crate) fn bearer_header(token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
    value.set_sensitive(true);
    Ok(value)
}

/// The token a request was sent with, if it used bearer auth.
pub(crate) fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
