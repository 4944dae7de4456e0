//! Authenticated client handle.
//!
//! An [`ApiClient`] is immutable: logging in produces a new handle via
//! [`ApiClient::with_token`] rather than mutating the one callers already
//! hold. Cloning is cheap (the underlying `reqwest::Client` is shared).

mod transport;

pub use transport::{TransportFactory, TransportSettings};

use std::fmt;

use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};

/// Header carrying the access token on authenticated requests
pub const TOKEN_HEADER: &str = "X-Vault-Token";

/// HTTP client bound to one upstream address, optionally carrying a token.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    address: String,
    token: Option<SecretString>,
}

impl ApiClient {
    pub(crate) fn new(http: reqwest::Client, address: impl Into<String>) -> Self {
        let address = address.into().trim_end_matches('/').to_string();
        Self {
            http,
            address,
            token: None,
        }
    }

    /// Upstream base address, without a trailing slash
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// New handle sharing the transport, authenticated with `token`.
    pub fn with_token(&self, token: SecretString) -> Self {
        Self {
            http: self.http.clone(),
            address: self.address.clone(),
            token: Some(token),
        }
    }

    /// Full URL of an API path, e.g. `auth/token/renew-self`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    /// Request builder for an API path; adds the token header when present.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.header(TOKEN_HEADER, token.expose_secret()),
            None => builder,
        }
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}
