//! Outcomes of ticks and rotations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::core::CredentialError;

/// A best-effort step that failed without failing the operation.
///
/// The authenticated state is still correct; the step is retried on a later
/// tick or left for the upstream to expire.
#[derive(Debug, Error)]
pub enum SoftFailure {
    /// Lease renewal gave up; the token may still be valid
    #[error("token renewal deferred to next tick: {0}")]
    Renewal(#[source] CredentialError),

    /// The pre-rotation token could not be revoked and will expire on its own
    #[error("old token not revoked: {0}")]
    TokenRevoke(#[source] CredentialError),

    /// The pre-rotation secret id is still valid upstream
    #[error("old secret id not destroyed: {0}")]
    SecretDestroy(#[source] CredentialError),
}

impl SoftFailure {
    pub fn error(&self) -> &CredentialError {
        match self {
            Self::Renewal(e) | Self::TokenRevoke(e) | Self::SecretDestroy(e) => e,
        }
    }
}

/// What happened to the token lease during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalStatus {
    Renewed { lease_duration: Duration },
    /// Recorded as [`SoftFailure::Renewal`]
    Failed,
    /// No client to renew
    Skipped,
}

/// What happened to the secret id during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStatus {
    /// No access record is stored
    NotConfigured,
    NotDue { remaining_secs: i64 },
    Rotated { rotation_id: Uuid },
}

/// Result of one successful rotation sequence
#[derive(Debug)]
pub struct RotationReport {
    /// Correlates the log lines of one rotation
    pub rotation_id: Uuid,
    /// The `last_renew_time` that was persisted
    pub renewed_at: DateTime<Utc>,
    pub soft_failures: Vec<SoftFailure>,
}

impl RotationReport {
    pub fn is_clean(&self) -> bool {
        self.soft_failures.is_empty()
    }
}

/// Result of one [`on_periodical`](super::CredentialController::on_periodical) call
#[derive(Debug)]
pub struct TickReport {
    pub renewal: RenewalStatus,
    pub rotation: RotationStatus,
    pub soft_failures: Vec<SoftFailure>,
}

impl TickReport {
    pub(crate) fn not_configured() -> Self {
        Self {
            renewal: RenewalStatus::Skipped,
            rotation: RotationStatus::NotConfigured,
            soft_failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.soft_failures.is_empty()
    }
}
