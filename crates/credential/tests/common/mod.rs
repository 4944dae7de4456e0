//! Shared fixtures: a scripted AppRole upstream and a hand-driven clock.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use warden_credential::exchange::{AppRole, TokenLease};
use warden_credential::prelude::*;
use warden_credential::{Clock, ConfigStore};

pub const INITIAL_SECRET: &str = "secret-initial";

/// One upstream call, in the order it was received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Login { secret_id: String },
    Generate { token: String },
    Destroy { secret_id: String },
    Renew { token: String },
    Revoke { token: String },
}

#[derive(Default)]
struct State {
    valid_secrets: HashSet<String>,
    /// token -> secret id it was issued for
    live_tokens: HashMap<String, String>,
    next_id: u32,
    calls: Vec<Call>,

    fail_logins: bool,
    fail_renewals: bool,
    fail_revokes: bool,
    fail_destroys: bool,
}

/// In-memory AppRole upstream with failure switches.
///
/// Secrets and tokens are tracked the way the real upstream does: a login
/// only succeeds with a secret id that was issued and not yet destroyed, and
/// authenticated calls only succeed with a token that was issued and not
/// yet revoked.
#[derive(Default)]
pub struct FakeUpstream {
    state: Mutex<State>,
}

impl FakeUpstream {
    pub fn with_secret(secret_id: &str) -> Arc<Self> {
        let upstream = Self::default();
        upstream.state.lock().valid_secrets.insert(secret_id.to_string());
        Arc::new(upstream)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn login_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Login { .. }))
            .count()
    }

    pub fn is_secret_valid(&self, secret_id: &str) -> bool {
        self.state.lock().valid_secrets.contains(secret_id)
    }

    pub fn is_token_live(&self, token: &str) -> bool {
        self.state.lock().live_tokens.contains_key(token)
    }

    pub fn fail_logins(&self, fail: bool) {
        self.state.lock().fail_logins = fail;
    }

    pub fn fail_renewals(&self, fail: bool) {
        self.state.lock().fail_renewals = fail;
    }

    pub fn fail_revokes(&self, fail: bool) {
        self.state.lock().fail_revokes = fail;
    }

    pub fn fail_destroys(&self, fail: bool) {
        self.state.lock().fail_destroys = fail;
    }

    fn authorize(state: &State, client: &ApiClient, op: &str) -> CredentialResult<String> {
        let token = client
            .token()
            .map(|t| t.expose_secret().to_string())
            .ok_or(CredentialError::NotInitialized)?;
        if state.live_tokens.contains_key(&token) {
            Ok(token)
        } else {
            Err(rejected(op, 403, "permission denied"))
        }
    }
}

fn rejected(operation: &str, status: u16, reason: &str) -> CredentialError {
    CredentialError::UpstreamAuth {
        operation: operation.to_string(),
        status: Some(status),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl RoleExchange for FakeUpstream {
    async fn login(
        &self,
        _client: &ApiClient,
        _approle: AppRole<'_>,
        _role_id: &str,
        secret_id: &SecretString,
    ) -> CredentialResult<SecretString> {
        let mut state = self.state.lock();
        let secret_id = secret_id.expose_secret().to_string();
        state.calls.push(Call::Login {
            secret_id: secret_id.clone(),
        });

        if state.fail_logins {
            return Err(rejected("approle login", 503, "upstream sealed"));
        }
        if !state.valid_secrets.contains(&secret_id) {
            return Err(rejected("approle login", 400, "invalid secret id"));
        }

        state.next_id += 1;
        let token = format!("token-{}", state.next_id);
        state.live_tokens.insert(token.clone(), secret_id);
        Ok(SecretString::from(token))
    }

    async fn generate_secret(
        &self,
        client: &ApiClient,
        _approle: AppRole<'_>,
    ) -> CredentialResult<SecretString> {
        let mut state = self.state.lock();
        let token = Self::authorize(&state, client, "generate secret id")?;
        state.calls.push(Call::Generate { token });

        state.next_id += 1;
        let secret_id = format!("secret-{}", state.next_id);
        state.valid_secrets.insert(secret_id.clone());
        Ok(SecretString::from(secret_id))
    }

    async fn destroy_secret(
        &self,
        client: &ApiClient,
        _approle: AppRole<'_>,
        secret_id: &SecretString,
    ) -> CredentialResult<()> {
        let mut state = self.state.lock();
        Self::authorize(&state, client, "destroy secret id")?;
        let secret_id = secret_id.expose_secret().to_string();
        state.calls.push(Call::Destroy {
            secret_id: secret_id.clone(),
        });

        if state.fail_destroys {
            return Err(rejected("destroy secret id", 500, "internal error"));
        }
        state.valid_secrets.remove(&secret_id);
        Ok(())
    }

    async fn renew_token(&self, client: &ApiClient) -> CredentialResult<TokenLease> {
        let mut state = self.state.lock();
        let token = client
            .token()
            .map(|t| t.expose_secret().to_string())
            .ok_or(CredentialError::NotInitialized)?;
        state.calls.push(Call::Renew {
            token: token.clone(),
        });

        if state.fail_renewals {
            return Err(rejected("renew token", 503, "upstream sealed"));
        }
        Self::authorize(&state, client, "renew token")?;
        Ok(TokenLease {
            lease_duration: Duration::from_secs(3600),
            renewable: true,
        })
    }

    async fn revoke_token(&self, client: &ApiClient) -> CredentialResult<()> {
        let mut state = self.state.lock();
        let token = client
            .token()
            .map(|t| t.expose_secret().to_string())
            .ok_or(CredentialError::NotInitialized)?;
        state.calls.push(Call::Revoke {
            token: token.clone(),
        });

        if state.fail_revokes {
            return Err(rejected("revoke token", 500, "internal error"));
        }
        state.live_tokens.remove(&token);
        Ok(())
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc::now()),
        })
    }

    pub fn advance(&self, secs: i64) {
        *self.now.lock() += TimeDelta::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub struct Harness {
    pub controller: Arc<CredentialController>,
    pub upstream: Arc<FakeUpstream>,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<MemoryStorage>,
}

impl Harness {
    /// Empty storage, upstream knows [`INITIAL_SECRET`]
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()), FakeUpstream::with_secret(INITIAL_SECRET))
    }

    pub fn with_storage(storage: Arc<MemoryStorage>, upstream: Arc<FakeUpstream>) -> Self {
        let clock = ManualClock::new();
        let controller = CredentialController::builder()
            .storage(storage.clone())
            .exchange(upstream.clone())
            .clock(clock.clone())
            .config(fast_config())
            .build()
            .expect("valid controller config");

        Self {
            controller: Arc::new(controller),
            upstream,
            clock,
            storage,
        }
    }

    /// Controller sharing this harness's storage and upstream, as after a restart
    pub fn restart(&self) -> Self {
        Self::with_storage(self.storage.clone(), self.upstream.clone())
    }

    pub async fn stored(&self) -> Option<AccessConfig> {
        ConfigStore::new(self.storage.clone()).get().await.unwrap()
    }

    pub async fn stored_secret(&self) -> String {
        self.stored()
            .await
            .expect("configured")
            .secret_id
            .expose_secret()
            .to_string()
    }

    pub fn current_token(&self) -> String {
        self.controller
            .api_client()
            .expect("initialized")
            .token()
            .expect("token")
            .expose_secret()
            .to_string()
    }

    /// Write an access record directly, as if configured by an earlier run
    pub async fn seed(&self, last_renew_age_secs: Option<i64>) {
        let mut config = request().validate().unwrap();
        config.last_renew_time =
            last_renew_age_secs.map(|age| self.clock.now() - TimeDelta::seconds(age));
        ConfigStore::new(self.storage.clone())
            .put(&config)
            .await
            .unwrap();
    }
}

/// Renewal retries without real delays
pub fn fast_config() -> ControllerConfig {
    ControllerConfig {
        renewal_retry: RetryPolicy::fixed(5, Duration::from_millis(1)),
        ..Default::default()
    }
}

/// A complete submission using [`INITIAL_SECRET`] and a 1000s TTL
pub fn request() -> ConfigureRequest {
    ConfigureRequest {
        api_url: Some("http://127.0.0.1:8200".into()),
        api_host: Some("vault.internal".into()),
        ca_cert: None,
        role_name: Some("plugin".into()),
        approle_mount_point: Some("auth/approle/".into()),
        role_id: Some("role-123".into()),
        secret_id: Some(INITIAL_SECRET.into()),
        secret_id_ttl: Some(1000),
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("warden_credential=debug")
        .try_init();
}
