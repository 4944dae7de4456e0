//! Builds the HTTP transport for an [`AccessConfig`].

use std::time::Duration;

use reqwest::header::{HOST, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::ApiClient;
use crate::core::{AccessConfig, CredentialError, CredentialResult, ValidationError};

/// Timeouts applied to every upstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Bound on TCP connect plus TLS handshake
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Bound on a whole request, response body included
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Creates unauthenticated [`ApiClient`]s.
///
/// The CA certificate is assumed to be pre-validated as PEM by the
/// configuration boundary. When present it replaces the built-in roots.
#[derive(Debug, Clone, Default)]
pub struct TransportFactory {
    settings: TransportSettings,
}

impl TransportFactory {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn build(&self, config: &AccessConfig) -> CredentialResult<ApiClient> {
        let host = HeaderValue::from_str(&config.api_host)
            .map_err(|e| ValidationError::new("vault_api_host", e.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(HOST, host);

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout);

        if let Some(pem) = config.ca_cert.as_deref().filter(|pem| !pem.trim().is_empty()) {
            let ca = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| CredentialError::transport("load ca certificate", e))?;
            builder = builder.tls_certs_only([ca]);
        }

        let http = builder
            .build()
            .map_err(|e| CredentialError::transport("build http client", e))?;

        tracing::debug!(
            address = %config.api_url,
            host = %config.api_host,
            custom_ca = config.ca_cert.is_some(),
            "Built upstream transport"
        );

        Ok(ApiClient::new(http, &config.api_url))
    }
}
