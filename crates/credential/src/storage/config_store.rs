//! Persists the single [`AccessConfig`] record.

use std::sync::Arc;

use super::Storage;
use crate::core::{AccessConfig, StorageError};

/// Storage key used when none is configured
pub const DEFAULT_STORAGE_KEY: &str = "configure_vault_access";

/// JSON codec for one [`AccessConfig`] under one storage key.
///
/// No optimistic concurrency at this layer: the controller's mutation lock
/// is the only serialization point.
#[derive(Clone)]
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
    key: String,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_key(storage, DEFAULT_STORAGE_KEY)
    }

    pub fn with_key(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the record; `Ok(None)` means "not configured".
    pub async fn get(&self) -> Result<Option<AccessConfig>, StorageError> {
        let Some(raw) = self.storage.get(&self.key).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| StorageError::Codec {
                key: self.key.clone(),
                source,
            })
    }

    pub async fn put(&self, config: &AccessConfig) -> Result<(), StorageError> {
        let raw = serde_json::to_vec(config).map_err(|source| StorageError::Codec {
            key: self.key.clone(),
            source,
        })?;
        self.storage.put(&self.key, raw).await
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").field("key", &self.key).finish()
    }
}
