//! Role-credential exchange protocol.
//!
//! [`RoleExchange`] is the seam between the controller and the upstream.
//! [`AppRoleExchange`] speaks the Vault AppRole HTTP API; tests substitute
//! scripted implementations.

mod approle;

pub use approle::AppRoleExchange;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::client::ApiClient;
use crate::core::{AccessConfig, CredentialResult};

/// Where the AppRole lives upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppRole<'a> {
    /// Mount path, e.g. `auth/approle`
    pub mount_point: &'a str,
    pub role_name: &'a str,
}

impl AccessConfig {
    pub fn approle(&self) -> AppRole<'_> {
        AppRole {
            mount_point: &self.approle_mount_point,
            role_name: &self.role_name,
        }
    }
}

/// Lease information returned by a token renewal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLease {
    pub lease_duration: Duration,
    pub renewable: bool,
}

/// Upstream operations the controller depends on.
///
/// No implementation retries on its own; callers wrap calls in
/// [`retry`](crate::retry::retry) where a bounded retry is wanted.
#[async_trait]
pub trait RoleExchange: Send + Sync {
    /// Exchange role id + secret id for an access token.
    async fn login(
        &self,
        client: &ApiClient,
        approle: AppRole<'_>,
        role_id: &str,
        secret_id: &SecretString,
    ) -> CredentialResult<SecretString>;

    /// Mint a new secret id for the role. Requires an authenticated client.
    async fn generate_secret(
        &self,
        client: &ApiClient,
        approle: AppRole<'_>,
    ) -> CredentialResult<SecretString>;

    /// Invalidate a secret id. A secret id that no longer exists is not an error.
    async fn destroy_secret(
        &self,
        client: &ApiClient,
        approle: AppRole<'_>,
        secret_id: &SecretString,
    ) -> CredentialResult<()>;

    /// Extend the lease of the client's token.
    async fn renew_token(&self, client: &ApiClient) -> CredentialResult<TokenLease>;

    /// Revoke the client's token.
    async fn revoke_token(&self, client: &ApiClient) -> CredentialResult<()>;
}
