//! Configuration types for the credential controller

use serde::{Deserialize, Serialize};

use crate::client::TransportSettings;
use crate::core::ValidationError;
use crate::retry::RetryPolicy;
use crate::storage::DEFAULT_STORAGE_KEY;

/// Tunables for [`CredentialController`](super::CredentialController)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Retry policy for lease renewal on each tick
    pub renewal_retry: RetryPolicy,

    /// Fraction of `secret_id_ttl` after which the secret id is rotated
    pub rotation_ratio: f64,

    /// Upstream connect and request timeouts
    pub transport: TransportSettings,

    /// Storage key holding the access record
    pub storage_key: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            renewal_retry: RetryPolicy::default(),
            rotation_ratio: 0.8,
            transport: TransportSettings::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.renewal_retry
            .validate()
            .map_err(|reason| ValidationError::new("renewal_retry", reason))?;

        if !(self.rotation_ratio > 0.0 && self.rotation_ratio <= 1.0) {
            return Err(ValidationError::new(
                "rotation_ratio",
                format!("must be in (0, 1], got {}", self.rotation_ratio),
            ));
        }
        if self.transport.connect_timeout.is_zero() {
            return Err(ValidationError::new("transport.connect_timeout", "must be non-zero"));
        }
        if self.transport.request_timeout.is_zero() {
            return Err(ValidationError::new("transport.request_timeout", "must be non-zero"));
        }
        if self.storage_key.trim().is_empty() {
            return Err(ValidationError::missing("storage_key"));
        }
        Ok(())
    }
}
