//! Keycloak credential backend
//!
//! Logs in with the onboarding manager's own client credentials and manages one
//! confidential client per edge node through the Keycloak admin REST API.

use crate::error::AuthError;
use crate::{AuthService, Credentials, edge_node_client_id};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const KEYCLOAK_REALM: &str = "master";
pub const ONBOARDING_MANAGER_CLIENT: &str = "host-manager-m2m-client";

/// Refresh the admin token this long before Keycloak expires it
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug)]
struct Session {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientRepresentation {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewClient {
    client_id: String,
    name: String,
    description: String,
    enabled: bool,
    client_authenticator_type: &'static str,
    protocol: &'static str,
    public_client: bool,
    bearer_only: bool,
    consent_required: bool,
    standard_flow_enabled: bool,
    implicit_flow_enabled: bool,
    direct_access_grants_enabled: bool,
    service_accounts_enabled: bool,
    full_scope_allowed: bool,
    default_client_scopes: Vec<&'static str>,
    optional_client_scopes: Vec<&'static str>,
}

impl NewClient {
    fn for_edge_node(uuid: &str) -> Self {
        Self {
            client_id: edge_node_client_id(uuid),
            name: format!("Edge Node {uuid}"),
            description: format!(
                "Client to use by Edge Node {}, created by Onboarding Manager at {}",
                uuid,
                chrono::Utc::now()
            ),
            enabled: true,
            client_authenticator_type: "client-secret",
            protocol: "openid-connect",
            public_client: false,
            bearer_only: false,
            consent_required: false,
            standard_flow_enabled: false,
            implicit_flow_enabled: false,
            direct_access_grants_enabled: false,
            service_accounts_enabled: true,
            full_scope_allowed: true,
            default_client_scopes: vec!["web-origins", "acr", "profile", "roles", "email"],
            optional_client_scopes: vec!["address", "phone", "offline_access", "microprofile-jwt"],
        }
    }
}

/// Keycloak-backed [`AuthService`]
#[derive(Debug)]
pub struct KeycloakAuthService {
    client: Client,
    base_url: String,
    client_secret: String,
    session: Mutex<Option<Session>>,
}

impl KeycloakAuthService {
    /// Create the service; the admin session is opened lazily on first use
    pub fn new(base_url: String, client_secret: String) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(AuthError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_secret,
            session: Mutex::new(None),
        })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, KEYCLOAK_REALM
        )
    }

    fn clients_url(&self) -> String {
        format!("{}/admin/realms/{}/clients", self.base_url, KEYCLOAK_REALM)
    }

    async fn login(&self) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", ONBOARDING_MANAGER_CLIENT),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Login(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Login(format!("{} - {}", status, body)));
        }

        let token: TokenResponse = response.json().await?;
        debug!("Keycloak client logged in successfully");
        Ok(Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN),
        })
    }

    /// Current admin access token, logging in again once it expires
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut session = self.session.lock().await;
        if let Some(s) = session.as_ref().filter(|s| s.expires_at > Instant::now()) {
            return Ok(s.access_token.clone());
        }
        let fresh = self.login().await?;
        let token = fresh.access_token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    async fn check(context: &str, response: Response) -> Result<Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(AuthError::NotFound(format!("{}: {}", context, body)));
        }
        Err(AuthError::Api(format!("{} failed: {} - {}", context, status, body)))
    }

    async fn find_clients(&self, client_id: &str) -> Result<Vec<ClientRepresentation>, AuthError> {
        let token = self.access_token().await?;
        let url = format!("{}?clientId={}", self.clients_url(), urlencoding::encode(client_id));
        debug!("GET {}", url);
        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let response = Self::check("list clients", response).await?;
        Ok(response.json().await?)
    }

    async fn client_secret(&self, id: &str, uuid: &str) -> Result<String, AuthError> {
        let token = self.access_token().await?;
        let url = format!("{}/{}/client-secret", self.clients_url(), id);
        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let response = Self::check("get client secret", response).await?;
        let secret: ClientSecret = response.json().await?;
        secret.value.filter(|v| !v.is_empty()).ok_or_else(|| {
            AuthError::Api(format!(
                "Received empty client secret for client ID {} (host UUID {})",
                id, uuid
            ))
        })
    }
}

#[async_trait::async_trait]
impl AuthService for KeycloakAuthService {
    async fn create_credentials(&self, tenant_id: &str, uuid: &str) -> Result<Credentials, AuthError> {
        info!("Creating Keycloak credentials for host {} (tenant {})", uuid, tenant_id);

        let token = self.access_token().await?;
        let new_client = NewClient::for_edge_node(uuid);
        let response = self
            .client
            .post(self.clients_url())
            .bearer_auth(token)
            .json(&new_client)
            .send()
            .await?;
        let response = Self::check("create client", response).await?;

        // Keycloak returns the internal ID in the Location header only
        let id = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|loc| loc.rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AuthError::Api(format!("No client ID returned for host UUID {uuid}")))?;
        debug!("Keycloak credentials for host {} created, ID: {}", uuid, id);

        let client_secret = self.client_secret(&id, uuid).await?;
        Ok(Credentials {
            client_id: new_client.client_id,
            client_secret,
        })
    }

    async fn get_credentials(&self, tenant_id: &str, uuid: &str) -> Result<Credentials, AuthError> {
        info!("Getting Keycloak credentials for host {} (tenant {})", uuid, tenant_id);

        let client_id = edge_node_client_id(uuid);
        let clients = self.find_clients(&client_id).await?;
        let Some(first) = clients.first() else {
            return Err(AuthError::NotFound(format!("No Keycloak clients found for UUID {uuid}")));
        };
        if clients.len() > 1 {
            warn!("More than one Keycloak client found for UUID {}, using the first one", uuid);
        }

        if let Some(secret) = first.secret.as_ref().filter(|s| !s.is_empty()) {
            return Ok(Credentials {
                client_id,
                client_secret: secret.clone(),
            });
        }

        let id = first
            .id
            .as_deref()
            .ok_or_else(|| AuthError::Api(format!("Keycloak client for UUID {uuid} has no ID")))?;
        let client_secret = self.client_secret(id, uuid).await?;
        Ok(Credentials {
            client_id,
            client_secret,
        })
    }

    async fn revoke_credentials(&self, tenant_id: &str, uuid: &str) -> Result<(), AuthError> {
        let clients = self.find_clients(&edge_node_client_id(uuid)).await?;
        if clients.is_empty() {
            return Err(AuthError::NotFound(format!("No Keycloak clients found for UUID {uuid}")));
        }
        if clients.len() > 1 {
            warn!("More than one Keycloak client found for UUID {}, deleting all", uuid);
        }

        for client in clients {
            let Some(id) = client.id else {
                debug!("Found Keycloak client for UUID {} with empty ID, skipping deletion", uuid);
                continue;
            };
            let token = self.access_token().await?;
            let url = format!("{}/{}", self.clients_url(), id);
            debug!("DELETE {}", url);
            let response = self.client.delete(&url).bearer_auth(token).send().await?;
            Self::check("delete client", response).await?;
            info!("Keycloak credentials for host {} (tenant {}) revoked, ID: {}", uuid, tenant_id, id);
        }
        Ok(())
    }

    async fn logout(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };
        let Some(refresh_token) = session.refresh_token else {
            return;
        };
        let url = format!(
            "{}/realms/{}/protocol/openid-connect/logout",
            self.base_url, KEYCLOAK_REALM
        );
        let result = self
            .client
            .post(url)
            .form(&[
                ("client_id", ONBOARDING_MANAGER_CLIENT),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await;
        if let Err(e) = result {
            warn!("Failed to logout from Keycloak: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let svc = KeycloakAuthService::new("https://keycloak.example/".to_string(), "s".to_string()).unwrap();
        assert_eq!(
            svc.token_url(),
            "https://keycloak.example/realms/master/protocol/openid-connect/token"
        );
        assert_eq!(svc.clients_url(), "https://keycloak.example/admin/realms/master/clients");
    }

    #[test]
    fn test_new_client_template() {
        let client = NewClient::for_edge_node("9d4a");
        assert_eq!(client.client_id, "edgenode-9d4a");
        let value = serde_json::to_value(&client).unwrap();
        assert_eq!(value["serviceAccountsEnabled"], true);
        assert_eq!(value["publicClient"], false);
        assert_eq!(value["clientAuthenticatorType"], "client-secret");
    }
}
