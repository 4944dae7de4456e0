//! Error types for the access controller
//!
//! `NotConfigured` and `NotInitialized` are expected control states, not
//! failures. Use [`CredentialError::is_not_ready`] to tell them apart from
//! real errors.

use thiserror::Error;

use crate::retry::RetryError;

/// Crate-wide error
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No access configuration has been stored yet
    #[error("vault access configuration is not set")]
    NotConfigured,

    /// A client was requested before any successful login
    #[error("vault api client is not initialized")]
    NotInitialized,

    /// A configuration field failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The persistence layer failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The upstream could not be reached (connect, TLS, timeout)
    #[error("transport error during {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream rejected the request or returned a malformed payload
    #[error("upstream rejected {operation}{}: {reason}", status_suffix(.status))]
    UpstreamAuth {
        operation: String,
        status: Option<u16>,
        reason: String,
    },

    /// A bounded retry loop gave up
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<CredentialError>,
    },
}

impl CredentialError {
    /// `true` for the "not ready yet" states that callers should not alarm on.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotConfigured | Self::NotInitialized)
    }

    pub(crate) fn transport(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            operation: operation.into(),
            source,
        }
    }

    pub(crate) fn upstream(
        operation: impl Into<String>,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UpstreamAuth {
            operation: operation.into(),
            status,
            reason: reason.into(),
        }
    }
}

impl From<RetryError<CredentialError>> for CredentialError {
    fn from(e: RetryError<CredentialError>) -> Self {
        Self::RetriesExhausted {
            operation: e.operation,
            attempts: e.attempts,
            last: Box::new(e.last),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Result type for controller operations
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Storage backend failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading a key failed
    #[error("failed to read '{key}': {source}")]
    ReadFailure {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing a key failed
    #[error("failed to write '{key}': {source}")]
    WriteFailure {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The stored bytes are not a valid record
    #[error("corrupt record at '{key}': {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A configuration field that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    /// Wire name of the offending field
    pub field: String,
    /// What is wrong with it
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Self::new(field, "is required and must not be empty")
    }
}
