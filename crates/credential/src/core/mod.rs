//! Core types for the access controller

mod clock;
mod config;
mod error;

pub use clock::{Clock, SystemClock};
pub use config::{AccessConfig, RotationDue};
pub use error::{CredentialError, CredentialResult, StorageError, ValidationError};
