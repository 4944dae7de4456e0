//! Key/value storage abstraction and the single-record config store.
//!
//! The controller never talks to a backend directly; it goes through
//! [`ConfigStore`], which encodes one [`AccessConfig`](crate::AccessConfig)
//! under one key.

mod config_store;
mod file;
mod memory;

pub use config_store::{ConfigStore, DEFAULT_STORAGE_KEY};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;

use crate::core::StorageError;

/// Durable byte storage keyed by string.
///
/// Reads and writes are single-key and last-writer-wins. Implementations
/// must be `Send + Sync` so one instance can sit behind an `Arc<dyn Storage>`
/// shared by the controller and the configuration boundary.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns `Ok(None)` if the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the value stored under `key`.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;
}
