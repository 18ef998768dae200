//! Token exchange for a device that received client credentials
//!
//! The device trades its client credentials for an IdP access token, then uses
//! that token to fetch a release-service token. Both endpoints trust only the
//! platform CA.

use crate::error::OnboardingError;
use reqwest::{Certificate, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const TOKEN_PATH: &str = "/realms/master/protocol/openid-connect/token";
const RELEASE_TOKEN_PATH: &str = "/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Tokens obtained by [`TokenExchange::client_auth`]
#[derive(Clone)]
pub struct DeviceTokens {
    pub access_token: String,
    /// Empty when the release service has no token for this deployment
    pub release_token: String,
}

impl std::fmt::Debug for DeviceTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTokens")
            .field("access_token", &"<redacted>")
            .field("release_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TokenExchange {
    client: Client,
    keycloak_url: String,
}

impl TokenExchange {
    /// `keycloak_url` may omit the scheme, in which case HTTPS is assumed
    pub fn new(keycloak_url: &str, ca_pem: &[u8]) -> Result<Self, OnboardingError> {
        let client = Client::builder()
            .add_root_certificate(Certificate::from_pem(ca_pem)?)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            keycloak_url: normalize_url(keycloak_url),
        })
    }

    fn token_url(&self) -> String {
        format!("{}{}", self.keycloak_url, TOKEN_PATH)
    }

    /// The release service sits next to Keycloak under the same domain
    fn release_url(&self) -> String {
        format!("{}{}", self.keycloak_url.replace("keycloak", "release"), RELEASE_TOKEN_PATH)
    }

    pub async fn access_token(&self, client_id: &str, client_secret: &str) -> Result<String, OnboardingError> {
        let url = self.token_url();
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OnboardingError::Auth(format!("token request failed: {status} - {body}")));
        }
        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(OnboardingError::Auth("received empty access token".to_string()));
        }
        Ok(token.access_token)
    }

    pub async fn release_token(&self, access_token: &str) -> Result<String, OnboardingError> {
        let url = self.release_url();
        debug!("GET {}", url);
        let response = self.client.get(&url).bearer_auth(access_token).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                parse_release_token(&body)
            }
            StatusCode::NO_CONTENT => {
                info!("Release service returned no token");
                Ok(String::new())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(OnboardingError::Auth(format!(
                    "release token request failed: {status} - {body}"
                )))
            }
        }
    }

    /// Exchange client credentials for the access and release tokens
    pub async fn client_auth(&self, client_id: &str, client_secret: &str) -> Result<DeviceTokens, OnboardingError> {
        let access_token = self.access_token(client_id, client_secret).await?;
        let release_token = self.release_token(&access_token).await?;
        Ok(DeviceTokens {
            access_token,
            release_token,
        })
    }
}

fn normalize_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn parse_release_token(body: &str) -> Result<String, OnboardingError> {
    let token = body.trim();
    if token.is_empty() || token == "null" {
        return Err(OnboardingError::Auth("invalid release token received".to_string()));
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let exchange = TokenExchange {
            client: Client::new(),
            keycloak_url: normalize_url("keycloak.edge.example/"),
        };
        assert_eq!(
            exchange.token_url(),
            "https://keycloak.edge.example/realms/master/protocol/openid-connect/token"
        );
        assert_eq!(exchange.release_url(), "https://release.edge.example/token");
    }

    #[test]
    fn test_normalize_keeps_scheme() {
        assert_eq!(normalize_url("http://kc:8080"), "http://kc:8080");
    }

    #[test]
    fn test_release_token_rejects_null() {
        assert!(parse_release_token("null").is_err());
        assert!(parse_release_token("  \n").is_err());
        assert_eq!(parse_release_token("abc\n").unwrap(), "abc");
    }
}
