//! Credential service errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Could not obtain an admin session
    #[error("Failed to login to Keycloak: {0}")]
    Login(String),

    /// No credentials exist for the device
    #[error("Not found: {0}")]
    NotFound(String),

    /// Keycloak answered with an unexpected status or payload
    #[error("Keycloak API error: {0}")]
    Api(String),
}

impl AuthError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
