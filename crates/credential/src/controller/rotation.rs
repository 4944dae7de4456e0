//! Secret id rotation sequence.
//!
//! ```text
//! 1. ensure an authenticated client (log in with the stored secret id)
//! 2. generate a new secret id
//! 3. persist it                       <- nothing destructive before this point
//! 4. revoke the current token         (soft)
//! 5. log in with the new secret id and publish the client
//! 6. destroy the old secret id        (soft)
//! ```
//!
//! A crash after step 3 leaves a stored secret id that was minted by the
//! upstream and never destroyed, so the next `init` can always log in.
//!
//! An old secret id that survives step 6 stays queued in the snapshot and
//! is destroyed by a later tick.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use super::{CredentialController, RotationReport, Snapshot, SoftFailure};
use crate::client::ApiClient;
use crate::core::{AccessConfig, CredentialResult};

impl CredentialController {
    /// Run the rotation sequence for `current`. Caller holds the snapshot lock.
    pub(super) async fn rotate_locked(
        &self,
        snapshot: &mut Snapshot,
        client: Option<ApiClient>,
        current: AccessConfig,
    ) -> CredentialResult<RotationReport> {
        let rotation_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "rotate_secret_id",
            %rotation_id,
            mount = %current.approle_mount_point,
            role = %current.role_name,
        );

        self.rotation_steps(snapshot, client, current, rotation_id)
            .instrument(span)
            .await
    }

    async fn rotation_steps(
        &self,
        snapshot: &mut Snapshot,
        client: Option<ApiClient>,
        current: AccessConfig,
        rotation_id: Uuid,
    ) -> CredentialResult<RotationReport> {
        let approle = current.approle();

        let client = match client.filter(ApiClient::has_token) {
            Some(client) => client,
            None => {
                debug!("No active token, logging in with stored secret id");
                self.login(&current, &current.secret_id).await?
            }
        };

        let new_secret = self.exchange.generate_secret(&client, approle).await?;
        debug!("Generated new secret id");

        let now = self.clock.now();
        let next = current.with_rotated_secret(new_secret, now);
        self.store.put(&next).await?;
        let renewed_at = next.last_renew_time.unwrap_or(now);
        snapshot.config = Some(next.clone());
        debug!(%renewed_at, "Persisted new secret id");

        let mut soft_failures = Vec::new();

        if let Err(e) = self.exchange.revoke_token(&client).await {
            warn!(error = %e, "Could not revoke old token, leaving it to expire");
            soft_failures.push(SoftFailure::TokenRevoke(e));
        }

        let fresh = match self.login(&next, &next.secret_id).await {
            Ok(fresh) => fresh,
            Err(e) => {
                // the old token is likely revoked; force the next init to log
                // in with the stored secret id
                self.client.store(None);
                error!(error = %e, "Login with new secret id failed, cached client cleared");
                return Err(e);
            }
        };
        self.client.store(Some(Arc::new(fresh.clone())));
        info!("Secret id and token rotated");

        let destroyed = self
            .exchange
            .destroy_secret(&fresh, approle, &current.secret_id)
            .await;
        if let Err(e) = destroyed {
            warn!(error = %e, "Could not destroy old secret id, queued for next tick");
            soft_failures.push(SoftFailure::SecretDestroy(e));
            snapshot.pending_destroy.push(current.secret_id);
        }

        Ok(RotationReport {
            rotation_id,
            renewed_at,
            soft_failures,
        })
    }

    /// Retry destroying secret ids a previous rotation left behind.
    ///
    /// Needs a published client; without one the queue is kept as is.
    pub(super) async fn destroy_pending(
        &self,
        snapshot: &mut Snapshot,
        config: &AccessConfig,
        soft_failures: &mut Vec<SoftFailure>,
    ) {
        if snapshot.pending_destroy.is_empty() {
            return;
        }
        let Some(client) = self.client.load_full() else {
            debug!(
                pending = snapshot.pending_destroy.len(),
                "No client, old secret id destroy deferred"
            );
            return;
        };

        let approle = config.approle();
        let mut still_pending: Vec<SecretString> = Vec::new();
        for secret_id in std::mem::take(&mut snapshot.pending_destroy) {
            match self.exchange.destroy_secret(&client, approle, &secret_id).await {
                Ok(()) => info!("Destroyed old secret id left by an earlier rotation"),
                Err(e) => {
                    warn!(error = %e, "Old secret id still not destroyed");
                    soft_failures.push(SoftFailure::SecretDestroy(e));
                    still_pending.push(secret_id);
                }
            }
        }
        snapshot.pending_destroy = still_pending;
    }
}
