//! Warden Credential - AppRole access controller
//!
//! Keeps a plugin authenticated against an upstream secrets API that speaks
//! the Vault AppRole protocol. A stable role id plus a rotating secret id are
//! exchanged for a short-lived token; the controller caches the
//! token-bearing client, renews its lease on every tick, and rotates the
//! secret id before it expires.
//!
//! # Features
//!
//! - **Single persisted record** - [`AccessConfig`] behind a key/value [`Storage`]
//! - **Lock-free readers** - [`CredentialController::api_client`] never waits on the network
//! - **Crash-safe rotation** - the new secret id is persisted before anything is revoked
//! - **Typed soft failures** - best-effort steps report [`SoftFailure`] instead of only logging
//! - **Bounded retries** - [`retry`] with fixed or exponential backoff
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_credential::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = CredentialController::builder()
//!     .storage(Arc::new(MemoryStorage::new()))
//!     .build()?;
//!
//! match controller.init().await {
//!     Ok(()) => {}
//!     Err(e) if e.is_not_ready() => println!("waiting for configuration"),
//!     Err(e) => return Err(e.into()),
//! }
//!
//! // on the host's timer
//! let report = controller.on_periodical().await?;
//! for failure in &report.soft_failures {
//!     println!("deferred: {failure}");
//! }
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

/// Client handle and transport construction
pub mod client;
/// Externally supplied configuration: validation and apply request
pub mod configure;
/// Credential controller: init, renewal, rotation
pub mod controller;
/// Core types and errors
pub mod core;
/// AppRole exchange protocol
pub mod exchange;
/// Bounded retry combinator
pub mod retry;
/// Key/value storage and the config store
pub mod storage;

// ── Root re-exports ─────────────────────────────────────────────────────────

pub use crate::client::{ApiClient, TransportFactory};
pub use crate::configure::{ApiConfigView, ConfigureRequest};
pub use crate::controller::{
    ControllerConfig, CredentialController, CredentialControllerBuilder, RenewalStatus,
    RotationReport, RotationStatus, SoftFailure, TickReport,
};
pub use crate::core::{
    AccessConfig, Clock, CredentialError, CredentialResult, RotationDue, StorageError,
    SystemClock, ValidationError,
};
pub use crate::exchange::{AppRoleExchange, RoleExchange};
pub use crate::retry::{Backoff, RetryError, RetryPolicy, retry};
pub use crate::storage::{ConfigStore, FileStorage, MemoryStorage, Storage};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::client::ApiClient;
    pub use crate::configure::ConfigureRequest;
    pub use crate::controller::{
        ControllerConfig, CredentialController, RotationStatus, SoftFailure, TickReport,
    };
    pub use crate::core::{AccessConfig, CredentialError, CredentialResult};
    pub use crate::exchange::{AppRoleExchange, RoleExchange};
    pub use crate::retry::{Backoff, RetryPolicy};
    pub use crate::storage::{FileStorage, MemoryStorage, Storage};
}
