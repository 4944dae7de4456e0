//! Externally supplied configuration.
//!
//! [`ConfigureRequest`] is what an operator submits; [`ConfigureRequest::validate`]
//! turns it into an [`AccessConfig`] or a field-qualified [`ValidationError`].
//! Applying a validated config is [`CredentialController::configure`].
//!
//! [`CredentialController::configure`]: crate::CredentialController::configure

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::core::{AccessConfig, ValidationError};

/// Shortest accepted `secret_id_ttl`
pub const MIN_SECRET_ID_TTL: Duration = Duration::from_secs(120);

/// Raw configuration submission. Every field is optional at this layer so
/// that a missing field is reported by name instead of as a decode error.
#[derive(Clone, Default, Deserialize)]
pub struct ConfigureRequest {
    #[serde(rename = "vault_api_url")]
    pub api_url: Option<String>,

    #[serde(rename = "vault_api_host")]
    pub api_host: Option<String>,

    #[serde(rename = "vault_api_ca")]
    pub ca_cert: Option<String>,

    pub role_name: Option<String>,

    pub approle_mount_point: Option<String>,

    pub role_id: Option<String>,

    pub secret_id: Option<String>,

    /// Seconds
    pub secret_id_ttl: Option<u64>,
}

impl ConfigureRequest {
    /// Check every field and build the record to persist.
    ///
    /// The returned config has never been rotated (`last_renew_time` is `None`),
    /// and its mount point has any trailing slash removed.
    pub fn validate(&self) -> Result<AccessConfig, ValidationError> {
        let api_url = required("vault_api_url", &self.api_url)?;
        match url::Url::parse(api_url) {
            Ok(parsed) if parsed.has_host() => {}
            Ok(_) => {
                return Err(ValidationError::new("vault_api_url", "url has no host"));
            }
            Err(e) => {
                return Err(ValidationError::new(
                    "vault_api_url",
                    format!("not an absolute url: {e}"),
                ));
            }
        }

        let api_host = required("vault_api_host", &self.api_host)?;

        let ca_cert = self
            .ca_cert
            .as_deref()
            .map(str::trim)
            .filter(|pem| !pem.is_empty());
        if let Some(ca) = ca_cert {
            pem::parse(ca).map_err(|e| {
                ValidationError::new("vault_api_ca", format!("not a valid PEM block: {e}"))
            })?;
        }

        let role_name = required("role_name", &self.role_name)?;
        let role_id = required("role_id", &self.role_id)?;
        let secret_id = required("secret_id", &self.secret_id)?;

        let ttl = self
            .secret_id_ttl
            .map(Duration::from_secs)
            .ok_or_else(|| ValidationError::missing("secret_id_ttl"))?;
        if ttl < MIN_SECRET_ID_TTL {
            return Err(ValidationError::new(
                "secret_id_ttl",
                format!(
                    "must be at least {}s, got {}s",
                    MIN_SECRET_ID_TTL.as_secs(),
                    ttl.as_secs()
                ),
            ));
        }

        let mount = required("approle_mount_point", &self.approle_mount_point)?;
        let mount = mount.trim_end_matches('/');
        if mount.is_empty() {
            return Err(ValidationError::missing("approle_mount_point"));
        }

        Ok(AccessConfig {
            api_url: api_url.to_string(),
            api_host: api_host.to_string(),
            ca_cert: ca_cert.map(String::from),
            role_name: role_name.to_string(),
            approle_mount_point: mount.to_string(),
            role_id: role_id.to_string(),
            secret_id: SecretString::from(secret_id.to_string()),
            secret_id_ttl: ttl,
            last_renew_time: None,
        })
    }
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::missing(field))
}

impl fmt::Debug for ConfigureRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigureRequest")
            .field("api_url", &self.api_url)
            .field("api_host", &self.api_host)
            .field("ca_cert", &self.ca_cert.as_ref().map(|_| "<pem>"))
            .field("role_name", &self.role_name)
            .field("approle_mount_point", &self.approle_mount_point)
            .field("role_id", &self.role_id)
            .field("secret_id", &self.secret_id.as_ref().map(|_| "***"))
            .field("secret_id_ttl", &self.secret_id_ttl)
            .finish()
    }
}

/// Non-secret connection settings of the stored config, for collaborators
/// that build their own upstream clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiConfigView {
    #[serde(rename = "vault_api_url")]
    pub api_url: String,
    #[serde(rename = "vault_api_host")]
    pub api_host: String,
    #[serde(rename = "vault_api_ca", skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
}

impl From<&AccessConfig> for ApiConfigView {
    fn from(config: &AccessConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_host: config.api_host.clone(),
            ca_cert: config.ca_cert.clone(),
        }
    }
}
