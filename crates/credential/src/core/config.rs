//! The persisted access record.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Connection and AppRole credentials for the upstream API.
///
/// Exactly one record exists per storage instance once the plugin has been
/// configured. `secret_id` rotates; everything else only changes when the
/// operator submits a new configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Absolute URL of the upstream API
    #[serde(rename = "vault_api_url")]
    pub api_url: String,

    /// Sent as the `Host` header on every request
    #[serde(rename = "vault_api_host")]
    pub api_host: String,

    /// PEM-encoded CA; `None` uses the system trust store
    #[serde(rename = "vault_api_ca", default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,

    pub role_name: String,

    /// AppRole mount path, without a trailing slash
    pub approle_mount_point: String,

    pub role_id: String,

    #[serde(with = "secret_string")]
    pub secret_id: SecretString,

    /// Nominal lifetime of a secret id
    #[serde(with = "duration_secs")]
    pub secret_id_ttl: Duration,

    /// Set after every successful rotation; `None` means never rotated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_renew_time: Option<DateTime<Utc>>,
}

/// Outcome of the rotation threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationDue {
    pub due: bool,
    /// Seconds left until the threshold; zero or negative once passed
    pub remaining_secs: i64,
}

impl AccessConfig {
    /// Whether the secret id should be rotated at `now`.
    ///
    /// `limit = ceil(secret_id_ttl * ratio)`; rotation is due once more than
    /// `limit` seconds have passed since `last_renew_time`, or immediately
    /// if the secret id was never rotated.
    pub fn rotation_due(&self, now: DateTime<Utc>, ratio: f64) -> RotationDue {
        let Some(last) = self.last_renew_time else {
            return RotationDue {
                due: true,
                remaining_secs: 0,
            };
        };

        let limit = (self.secret_id_ttl.as_secs_f64() * ratio).ceil() as i64;
        let elapsed = (now - last).num_seconds();

        RotationDue {
            due: elapsed > limit,
            remaining_secs: limit - elapsed,
        }
    }

    /// Copy of this record carrying a freshly generated secret id.
    ///
    /// `last_renew_time` never moves backwards, even if the wall clock does.
    pub fn with_rotated_secret(&self, secret_id: SecretString, now: DateTime<Utc>) -> Self {
        let renewed_at = match self.last_renew_time {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        Self {
            secret_id,
            last_renew_time: Some(renewed_at),
            ..self.clone()
        }
    }

    /// `true` if `self` should replace `old` as the active configuration.
    pub fn is_preferable_to(&self, old: Option<&Self>) -> bool {
        old.is_none_or(|old| self != old)
    }
}

impl PartialEq for AccessConfig {
    fn eq(&self, other: &Self) -> bool {
        self.api_url == other.api_url
            && self.api_host == other.api_host
            && self.ca_cert == other.ca_cert
            && self.role_name == other.role_name
            && self.approle_mount_point == other.approle_mount_point
            && self.role_id == other.role_id
            && self.secret_id.expose_secret() == other.secret_id.expose_secret()
            && self.secret_id_ttl == other.secret_id_ttl
            && self.last_renew_time == other.last_renew_time
    }
}

impl fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessConfig")
            .field("api_url", &self.api_url)
            .field("api_host", &self.api_host)
            .field("ca_cert", &self.ca_cert.as_ref().map(|_| "<pem>"))
            .field("role_name", &self.role_name)
            .field("approle_mount_point", &self.approle_mount_point)
            .field("role_id", &self.role_id)
            .field("secret_id", &"***")
            .field("secret_id_ttl", &self.secret_id_ttl)
            .field("last_renew_time", &self.last_renew_time)
            .finish()
    }
}

mod secret_string {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(secret: &SecretString, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(secret.expose_secret())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SecretString, D::Error> {
        String::deserialize(d).map(SecretString::from)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
