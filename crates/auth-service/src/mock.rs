//! Mock AuthService for unit testing

use crate::error::AuthError;
use crate::{AuthService, Credentials, edge_node_client_id};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory credential store keyed by device UUID
#[derive(Clone, Default)]
pub struct MockAuthService {
    pub(crate) credentials: Arc<Mutex<HashMap<String, Credentials>>>,
    pub(crate) created: Arc<Mutex<Vec<String>>>,
    pub(crate) revoked: Arc<Mutex<Vec<String>>>,
    pub(crate) fail_create: Arc<Mutex<bool>>,
    pub(crate) fail_get: Arc<Mutex<bool>>,
    pub(crate) fail_revoke: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for MockAuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAuthService").finish_non_exhaustive()
    }
}

impl MockAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-provision credentials for a device (for test setup)
    pub fn add_credentials(&self, uuid: &str, client_secret: &str) {
        self.credentials.lock().unwrap().insert(
            uuid.to_string(),
            Credentials {
                client_id: edge_node_client_id(uuid),
                client_secret: client_secret.to_string(),
            },
        );
    }

    pub fn set_fail_create(&self, fail: bool) {
        *self.fail_create.lock().unwrap() = fail;
    }

    pub fn set_fail_get(&self, fail: bool) {
        *self.fail_get.lock().unwrap() = fail;
    }

    pub fn set_fail_revoke(&self, fail: bool) {
        *self.fail_revoke.lock().unwrap() = fail;
    }

    /// UUIDs passed to `create_credentials`
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    /// UUIDs passed to `revoke_credentials`
    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }

    pub fn has_credentials(&self, uuid: &str) -> bool {
        self.credentials.lock().unwrap().contains_key(uuid)
    }
}

#[async_trait::async_trait]
impl AuthService for MockAuthService {
    async fn create_credentials(&self, _tenant_id: &str, uuid: &str) -> Result<Credentials, AuthError> {
        self.created.lock().unwrap().push(uuid.to_string());
        if *self.fail_create.lock().unwrap() {
            return Err(AuthError::Api(format!("create failed for {uuid}")));
        }
        let creds = Credentials {
            client_id: edge_node_client_id(uuid),
            client_secret: format!("secret-{uuid}"),
        };
        self.credentials
            .lock()
            .unwrap()
            .insert(uuid.to_string(), creds.clone());
        Ok(creds)
    }

    async fn get_credentials(&self, _tenant_id: &str, uuid: &str) -> Result<Credentials, AuthError> {
        if *self.fail_get.lock().unwrap() {
            return Err(AuthError::Api(format!("get failed for {uuid}")));
        }
        self.credentials
            .lock()
            .unwrap()
            .get(uuid)
            .cloned()
            .ok_or_else(|| AuthError::NotFound(format!("No Keycloak clients found for UUID {uuid}")))
    }

    async fn revoke_credentials(&self, _tenant_id: &str, uuid: &str) -> Result<(), AuthError> {
        self.revoked.lock().unwrap().push(uuid.to_string());
        if *self.fail_revoke.lock().unwrap() {
            return Err(AuthError::Api(format!("revoke failed for {uuid}")));
        }
        match self.credentials.lock().unwrap().remove(uuid) {
            Some(_) => Ok(()),
            None => Err(AuthError::NotFound(format!("No Keycloak clients found for UUID {uuid}"))),
        }
    }

    async fn logout(&self) {}
}
