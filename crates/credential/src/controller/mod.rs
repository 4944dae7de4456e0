//! Credential Controller - keeps an authenticated upstream client alive
//!
//! The controller owns two pieces of state:
//!
//! - the published client handle, swapped atomically so
//!   [`api_client`](CredentialController::api_client) never waits
//! - the [`Snapshot`] behind an async mutex, which serializes `init`,
//!   `reinit`, `configure` and every tick
//!
//! Network calls happen while holding the mutex but never while a reader
//! needs anything, so slow upstream round trips only delay other mutations.

mod config;
mod report;
mod rotation;

pub use config::ControllerConfig;
pub use report::{RenewalStatus, RotationReport, RotationStatus, SoftFailure, TickReport};

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{ApiClient, TransportFactory};
use crate::configure::{ApiConfigView, ConfigureRequest};
use crate::core::{AccessConfig, Clock, CredentialError, CredentialResult, SystemClock};
use crate::exchange::{AppRoleExchange, RoleExchange};
use crate::retry::retry;
use crate::storage::{ConfigStore, Storage};

/// Drives login, lease renewal and secret id rotation for one access record.
///
/// Construct once per host process and share it behind an `Arc`.
pub struct CredentialController {
    store: ConfigStore,
    exchange: Arc<dyn RoleExchange>,
    transport: TransportFactory,
    config: ControllerConfig,
    clock: Arc<dyn Clock>,

    client: ArcSwapOption<ApiClient>,
    snapshot: Mutex<Snapshot>,
}

/// Mutable controller state guarded by the tick mutex.
#[derive(Default)]
struct Snapshot {
    /// Record the published client logged in with
    config: Option<AccessConfig>,

    /// Superseded secret ids whose destroy failed; retried every tick
    pending_destroy: Vec<SecretString>,
}

impl CredentialController {
    /// Create builder for constructing a controller
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use warden_credential::prelude::*;
    ///
    /// # fn example() -> Result<(), CredentialError> {
    /// let controller = CredentialController::builder()
    ///     .storage(Arc::new(MemoryStorage::new()))
    ///     .config(ControllerConfig {
    ///         rotation_ratio: 0.5,
    ///         ..Default::default()
    ///     })
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> CredentialControllerBuilder<No> {
        CredentialControllerBuilder::new()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Log in with the stored secret id and cache the client.
    ///
    /// Returns immediately, without contacting the upstream, if a client is
    /// already cached.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::NotConfigured`] if no access record is stored
    /// - [`CredentialError::Transport`] / [`CredentialError::UpstreamAuth`] if
    ///   login fails; nothing is cached in that case
    #[tracing::instrument(skip(self))]
    pub async fn init(&self) -> CredentialResult<()> {
        let mut snapshot = self.snapshot.lock().await;
        self.init_locked(&mut snapshot).await
    }

    /// Discard the cached client without contacting the upstream, then [`init`](Self::init).
    ///
    /// Use after the current token was invalidated out of band.
    #[tracing::instrument(skip(self))]
    pub async fn reinit(&self) -> CredentialResult<()> {
        let mut snapshot = self.snapshot.lock().await;
        self.client.store(None);
        snapshot.config = None;
        info!("Discarded cached client");
        self.init_locked(&mut snapshot).await
    }

    /// The cached authenticated client.
    ///
    /// Lock-free: callers observe either the pre- or post-rotation client.
    pub fn api_client(&self) -> CredentialResult<Arc<ApiClient>> {
        self.client
            .load_full()
            .ok_or(CredentialError::NotInitialized)
    }

    /// Non-secret connection settings of the stored record.
    pub async fn api_config(&self) -> CredentialResult<ApiConfigView> {
        let config = self.store.get().await?.ok_or(CredentialError::NotConfigured)?;
        Ok(ApiConfigView::from(&config))
    }

    /// Validate and apply a submitted configuration.
    ///
    /// Logs in with the submitted pair, then immediately runs the rotation
    /// sequence so the submitted secret id is replaced and destroyed. The
    /// record is first persisted by the rotation itself; a rejected
    /// submission or a failed login leaves storage untouched.
    #[tracing::instrument(skip_all)]
    pub async fn configure(&self, request: &ConfigureRequest) -> CredentialResult<RotationReport> {
        let config = request.validate().inspect_err(|e| {
            warn!(field = %e.field, reason = %e.reason, "Rejected access configuration");
        })?;

        let mut snapshot = self.snapshot.lock().await;
        let stored = self.store.get().await.unwrap_or_else(|e| {
            warn!(error = %e, "Stored access record unreadable, replacing it");
            None
        });
        if config.is_preferable_to(stored.as_ref()) {
            info!(
                replacing = stored.is_some(),
                mount = %config.approle_mount_point,
                role = %config.role_name,
                "Applying access configuration"
            );
        } else {
            debug!("Submitted configuration matches the stored record");
        }

        let client = self.login(&config, &config.secret_id).await?;
        self.rotate_locked(&mut snapshot, Some(client), config).await
    }

    /// Periodic maintenance; call on the host's timer.
    ///
    /// Renews the token lease (bounded retry) and rotates the secret id when
    /// due. A controller with no cached client tries [`init`](Self::init)
    /// first; an unconfigured controller makes the whole tick a no-op.
    ///
    /// Old secret ids left over from a failed destroy are retried before the
    /// rotation check. Renewal failures, failed token revokes and failed
    /// secret destroys are reported in [`TickReport::soft_failures`]. Rotation failures before
    /// the new client is published are returned as errors.
    #[tracing::instrument(skip(self))]
    pub async fn on_periodical(&self) -> CredentialResult<TickReport> {
        let mut snapshot = self.snapshot.lock().await;
        let mut soft_failures = Vec::new();

        let renewal = match self.init_locked(&mut snapshot).await {
            Ok(()) => self.renew(&mut soft_failures).await,
            Err(CredentialError::NotConfigured) => {
                warn!("Access not configured, skipping tick");
                return Ok(TickReport::not_configured());
            }
            Err(e) => {
                warn!(error = %e, "Could not initialize client, renewal skipped");
                soft_failures.push(SoftFailure::Renewal(e));
                RenewalStatus::Failed
            }
        };

        let Some(config) = self.store.get().await? else {
            warn!("Access not configured, rotation skipped");
            return Ok(TickReport {
                renewal,
                rotation: RotationStatus::NotConfigured,
                soft_failures,
            });
        };

        if snapshot
            .config
            .as_ref()
            .is_some_and(|last| config.is_preferable_to(Some(last)))
        {
            debug!("Stored record changed since last read");
        }

        self.destroy_pending(&mut snapshot, &config, &mut soft_failures)
            .await;

        let check = config.rotation_due(self.clock.now(), self.config.rotation_ratio);
        let rotation = if check.due {
            debug!("Rotating secret id");
            let client = self.client.load_full().map(|c| (*c).clone());
            let report = self.rotate_locked(&mut snapshot, client, config).await?;
            soft_failures.extend(report.soft_failures);
            RotationStatus::Rotated {
                rotation_id: report.rotation_id,
            }
        } else {
            info!(remaining_secs = check.remaining_secs, "No need to rotate secret id");
            snapshot.config = Some(config);
            RotationStatus::NotDue {
                remaining_secs: check.remaining_secs,
            }
        };

        Ok(TickReport {
            renewal,
            rotation,
            soft_failures,
        })
    }

    async fn init_locked(&self, snapshot: &mut Snapshot) -> CredentialResult<()> {
        if self.client.load().is_some() {
            debug!("Client already initialized");
            return Ok(());
        }

        let config = self.store.get().await?.ok_or(CredentialError::NotConfigured)?;
        let client = self.login(&config, &config.secret_id).await?;
        self.client.store(Some(Arc::new(client)));

        info!(
            address = %config.api_url,
            mount = %config.approle_mount_point,
            "Upstream client initialized"
        );
        snapshot.config = Some(config);
        Ok(())
    }

    async fn renew(&self, soft_failures: &mut Vec<SoftFailure>) -> RenewalStatus {
        let Some(client) = self.client.load_full() else {
            return RenewalStatus::Skipped;
        };

        let result = retry(&self.config.renewal_retry, "renew token", || {
            self.exchange.renew_token(&client)
        })
        .await;

        match result {
            Ok(lease) => {
                info!(
                    lease_secs = lease.lease_duration.as_secs(),
                    renewable = lease.renewable,
                    "Token lease renewed"
                );
                RenewalStatus::Renewed {
                    lease_duration: lease.lease_duration,
                }
            }
            Err(e) => {
                let e = CredentialError::from(e);
                warn!(error = %e, "Token lease not renewed");
                soft_failures.push(SoftFailure::Renewal(e));
                RenewalStatus::Failed
            }
        }
    }

    /// Fresh transport plus a login with `secret_id`.
    async fn login(
        &self,
        config: &AccessConfig,
        secret_id: &SecretString,
    ) -> CredentialResult<ApiClient> {
        let anonymous = self.transport.build(config)?;
        let token = self
            .exchange
            .login(&anonymous, config.approle(), &config.role_id, secret_id)
            .await?;
        Ok(anonymous.with_token(token))
    }
}

impl fmt::Debug for CredentialController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialController")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("initialized", &self.client.load().is_some())
            .finish_non_exhaustive()
    }
}

/// Builder state before storage is set
#[doc(hidden)]
#[derive(Debug, Clone, Copy, Default)]
pub struct No;

/// Builder for [`CredentialController`]
///
/// Storage is required and enforced at compile time: `build` only exists
/// once [`storage`](CredentialControllerBuilder::storage) has been called.
pub struct CredentialControllerBuilder<S> {
    storage: S,
    exchange: Option<Arc<dyn RoleExchange>>,
    clock: Option<Arc<dyn Clock>>,
    config: ControllerConfig,
}

impl CredentialControllerBuilder<No> {
    pub fn new() -> Self {
        Self {
            storage: No,
            exchange: None,
            clock: None,
            config: ControllerConfig::default(),
        }
    }

    /// Set the key/value storage holding the access record (required)
    pub fn storage(self, storage: Arc<dyn Storage>) -> CredentialControllerBuilder<Arc<dyn Storage>> {
        CredentialControllerBuilder {
            storage,
            exchange: self.exchange,
            clock: self.clock,
            config: self.config,
        }
    }
}

impl<S> CredentialControllerBuilder<S> {
    /// Upstream protocol implementation; defaults to [`AppRoleExchange`]
    pub fn exchange(mut self, exchange: Arc<dyn RoleExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Time source for rotation decisions; defaults to [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }
}

impl CredentialControllerBuilder<Arc<dyn Storage>> {
    /// Build the controller
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Validation`] if the [`ControllerConfig`] is invalid.
    pub fn build(self) -> CredentialResult<CredentialController> {
        self.config.validate()?;

        Ok(CredentialController {
            store: ConfigStore::with_key(self.storage, self.config.storage_key.clone()),
            exchange: self
                .exchange
                .unwrap_or_else(|| Arc::new(AppRoleExchange::new())),
            transport: TransportFactory::new(self.config.transport),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
            client: ArcSwapOption::empty(),
            snapshot: Mutex::new(Snapshot::default()),
        })
    }
}

impl Default for CredentialControllerBuilder<No> {
    fn default() -> Self {
        Self::new()
    }
}
