//! Vault AppRole implementation of [`RoleExchange`].
//!
//! ```text
//! login     POST {mount}/login                         {role_id, secret_id} -> auth.client_token
//! generate  POST {mount}/role/{role}/secret-id                              -> data.secret_id
//! destroy   POST {mount}/role/{role}/secret-id/destroy {secret_id}          -> 2xx | 404
//! renew     POST auth/token/renew-self                                      -> auth
//! revoke    POST auth/token/revoke-self                                     -> 2xx
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{AppRole, RoleExchange, TokenLease};
use crate::client::ApiClient;
use crate::core::{CredentialError, CredentialResult};

#[derive(Deserialize)]
struct AuthEnvelope {
    auth: Option<AuthData>,
}

#[derive(Deserialize)]
struct AuthData {
    #[serde(default)]
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Deserialize)]
struct DataEnvelope {
    data: Option<SecretIdData>,
}

#[derive(Deserialize)]
struct SecretIdData {
    secret_id: Option<String>,
}

/// Stateless AppRole client; the mount and role come with every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppRoleExchange;

impl AppRoleExchange {
    pub fn new() -> Self {
        Self
    }
}

async fn send(operation: &str, request: RequestBuilder) -> CredentialResult<Response> {
    let resp = request
        .send()
        .await
        .map_err(|e| CredentialError::transport(operation, e))?;

    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(rejection(operation, resp).await)
    }
}

/// Turn a non-2xx response into an error carrying the upstream `errors` list.
async fn rejection(operation: &str, resp: Response) -> CredentialError {
    let status = resp.status().as_u16();
    let errors: Vec<String> = resp
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| {
            v.get("errors")?.as_array().map(|arr| {
                arr.iter()
                    .filter_map(|e| e.as_str().map(String::from))
                    .collect()
            })
        })
        .unwrap_or_default();

    let reason = if errors.is_empty() {
        StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request rejected")
            .to_string()
    } else {
        errors.join(", ")
    };
    CredentialError::upstream(operation, Some(status), reason)
}

async fn decode<T: for<'de> Deserialize<'de>>(operation: &str, resp: Response) -> CredentialResult<T> {
    resp.json::<T>()
        .await
        .map_err(|e| CredentialError::upstream(operation, None, format!("malformed response: {e}")))
}

fn require_token(client: &ApiClient) -> CredentialResult<()> {
    if client.has_token() {
        Ok(())
    } else {
        Err(CredentialError::NotInitialized)
    }
}

#[async_trait]
impl RoleExchange for AppRoleExchange {
    #[tracing::instrument(skip(self, client, secret_id), fields(mount = approle.mount_point))]
    async fn login(
        &self,
        client: &ApiClient,
        approle: AppRole<'_>,
        role_id: &str,
        secret_id: &SecretString,
    ) -> CredentialResult<SecretString> {
        const OP: &str = "approle login";
        let path = format!("{}/login", approle.mount_point);
        let body = json!({ "role_id": role_id, "secret_id": secret_id.expose_secret() });

        let resp = send(OP, client.request(Method::POST, &path).json(&body)).await?;
        let envelope: AuthEnvelope = decode(OP, resp).await?;

        let auth = envelope
            .auth
            .ok_or_else(|| CredentialError::upstream(OP, None, "login response does not contain auth"))?;
        if auth.client_token.is_empty() {
            return Err(CredentialError::upstream(OP, None, "login response has empty client_token"));
        }

        tracing::debug!(lease_secs = auth.lease_duration, "AppRole login succeeded");
        Ok(SecretString::from(auth.client_token))
    }

    #[tracing::instrument(skip(self, client), fields(mount = approle.mount_point, role = approle.role_name))]
    async fn generate_secret(
        &self,
        client: &ApiClient,
        approle: AppRole<'_>,
    ) -> CredentialResult<SecretString> {
        const OP: &str = "generate secret id";
        require_token(client)?;
        let path = format!("{}/role/{}/secret-id", approle.mount_point, approle.role_name);

        let resp = send(OP, client.request(Method::POST, &path)).await?;
        let envelope: DataEnvelope = decode(OP, resp).await?;

        envelope
            .data
            .and_then(|d| d.secret_id)
            .filter(|s| !s.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| CredentialError::upstream(OP, None, "response does not contain data.secret_id"))
    }

    #[tracing::instrument(skip(self, client, secret_id), fields(mount = approle.mount_point, role = approle.role_name))]
    async fn destroy_secret(
        &self,
        client: &ApiClient,
        approle: AppRole<'_>,
        secret_id: &SecretString,
    ) -> CredentialResult<()> {
        const OP: &str = "destroy secret id";
        require_token(client)?;
        let path = format!(
            "{}/role/{}/secret-id/destroy",
            approle.mount_point, approle.role_name
        );
        let body = json!({ "secret_id": secret_id.expose_secret() });

        match send(OP, client.request(Method::POST, &path).json(&body)).await {
            Ok(_) => Ok(()),
            Err(CredentialError::UpstreamAuth {
                status: Some(404), ..
            }) => {
                tracing::debug!("Secret id already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self, client))]
    async fn renew_token(&self, client: &ApiClient) -> CredentialResult<TokenLease> {
        const OP: &str = "renew token";
        require_token(client)?;

        let resp = send(
            OP,
            client
                .request(Method::POST, "auth/token/renew-self")
                .json(&json!({})),
        )
        .await?;
        let envelope: AuthEnvelope = decode(OP, resp).await?;
        let auth = envelope
            .auth
            .ok_or_else(|| CredentialError::upstream(OP, None, "renew response does not contain auth"))?;

        Ok(TokenLease {
            lease_duration: Duration::from_secs(auth.lease_duration),
            renewable: auth.renewable,
        })
    }

    #[tracing::instrument(skip(self, client))]
    async fn revoke_token(&self, client: &ApiClient) -> CredentialResult<()> {
        require_token(client)?;
        send(
            "revoke token",
            client.request(Method::POST, "auth/token/revoke-self"),
        )
        .await
        .map(|_| ())
    }
}
