//! Device credential service
//!
//! Issues, fetches and revokes the per-device client credentials edge nodes use
//! to authenticate. [`AuthService`] is the capability the onboarding manager
//! depends on; [`KeycloakAuthService`] is the production backend.

pub mod error;
pub mod keycloak;
#[cfg(feature = "test-util")]
pub mod mock;

pub use error::AuthError;
pub use keycloak::KeycloakAuthService;
#[cfg(feature = "test-util")]
pub use mock::MockAuthService;

use std::fmt;

/// Client credentials issued to a single edge node
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Client ID used for the credentials of the device with `uuid`
#[must_use]
pub fn edge_node_client_id(uuid: &str) -> String {
    format!("edgenode-{uuid}")
}

/// Credential issuance capability
///
/// Every call is scoped to a tenant and identifies the device by its UUID.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Create credentials for the device
    async fn create_credentials(&self, tenant_id: &str, uuid: &str) -> Result<Credentials, AuthError>;

    /// Fetch existing credentials; `AuthError::NotFound` when none exist
    async fn get_credentials(&self, tenant_id: &str, uuid: &str) -> Result<Credentials, AuthError>;

    /// Delete every credential issued to the device; `AuthError::NotFound` when none exist
    async fn revoke_credentials(&self, tenant_id: &str, uuid: &str) -> Result<(), AuthError>;

    /// End the admin session, if any
    async fn logout(&self);
}
