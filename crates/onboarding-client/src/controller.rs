//! Onboarding controller
//!
//! Tries the streaming path first and only switches to the interactive path
//! when the streaming path asks for it.

use crate::DeviceInfo;
use crate::error::OnboardingError;
use crate::files::CredentialFiles;
use crate::interactive::{onboard_with_retry, run_auth_script};
use crate::noninteractive::{NonInteractiveClient, StreamResult};
use crate::token::TokenExchange;
use crate::transport::GrpcNodeRegistrar;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Onboarding manager (interactive service) host
    pub obm_svc: String,
    /// Onboarding stream (non-interactive service) host
    pub obs_svc: String,
    pub obm_port: u16,
    pub keycloak_url: String,
    pub device: DeviceInfo,
    pub ca_cert_path: PathBuf,
    /// Contents of the client-auth script run for the interactive path
    pub auth_script: Vec<u8>,
}

#[derive(Debug)]
pub struct OnboardingController {
    config: DiscoveryConfig,
    files: CredentialFiles,
}

impl OnboardingController {
    pub fn new(config: DiscoveryConfig, files: CredentialFiles) -> Self {
        Self { config, files }
    }

    pub async fn execute(&self, cancel: &CancellationToken) -> Result<(), OnboardingError> {
        info!("Starting device onboarding...");
        let ca_pem = tokio::fs::read(&self.config.ca_cert_path).await.map_err(|e| {
            OnboardingError::InvalidConfig(format!(
                "failed to read CA certificate {}: {e}",
                self.config.ca_cert_path.display()
            ))
        })?;

        info!("Attempting non-interactive (streaming) onboarding...");
        let client = NonInteractiveClient::new(
            self.config.obs_svc.clone(),
            self.config.obm_port,
            self.config.device.clone(),
        );
        let result = client.onboard(&ca_pem, &self.files, cancel).await;

        if result.should_fallback {
            if let Some(reason) = &result.error {
                info!("Executing fallback to interactive mode because: {}", reason);
            }
            return self.execute_interactive(ca_pem, cancel).await;
        }

        self.complete_non_interactive(result, &ca_pem).await
    }

    async fn complete_non_interactive(&self, result: StreamResult, ca_pem: &[u8]) -> Result<(), OnboardingError> {
        if let Some(err) = result.error {
            warn!("Non-interactive onboarding failed: {}", err);
            return Err(err);
        }

        self.files.save_client_id(&result.client_id)?;
        self.files.save_client_secret(&result.client_secret)?;
        info!("Credentials written successfully.");

        let exchange = TokenExchange::new(&self.config.keycloak_url, ca_pem)?;
        let tokens = exchange.client_auth(&result.client_id, &result.client_secret).await?;
        self.files.save_access_token(&tokens.access_token)?;
        self.files.save_release_token(&tokens.release_token)?;
        info!("Tokens saved successfully (non-interactive mode)");
        Ok(())
    }

    async fn execute_interactive(&self, ca_pem: Vec<u8>, cancel: &CancellationToken) -> Result<(), OnboardingError> {
        info!("Starting interactive (manual) onboarding...");
        info!("Executing client authentication script...");
        run_auth_script(&self.config.auth_script, cancel).await?;

        let token = self.files.read_access_token().await.map_err(|e| {
            OnboardingError::Auth(format!("failed to read access token left by client-auth script: {e}"))
        })?;
        let registrar = GrpcNodeRegistrar::new(self.config.obm_svc.clone(), self.config.obm_port, ca_pem, token);
        let project_id = onboard_with_retry(&registrar, &self.config.device, &self.files, cancel).await?;
        info!("Device discovery completed (interactive mode), project {}", project_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ca_cert_path: PathBuf) -> DiscoveryConfig {
        DiscoveryConfig {
            obm_svc: "obm.invalid".to_string(),
            obs_svc: "obs.invalid".to_string(),
            obm_port: 443,
            keycloak_url: "keycloak.invalid".to_string(),
            device: DeviceInfo::default(),
            ca_cert_path,
            auth_script: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_ca_certificate_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let controller = OnboardingController::new(
            config(dir.path().join("missing.pem")),
            CredentialFiles::new(dir.path()),
        );

        let err = controller.execute(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OnboardingError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_failed_stream_is_reported_without_writing_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let files = CredentialFiles::new(dir.path());
        let controller = OnboardingController::new(config(dir.path().join("ca.pem")), files);

        let result = StreamResult {
            error: Some(OnboardingError::Protocol("stream closed by server".to_string())),
            ..StreamResult::default()
        };
        let err = controller.complete_non_interactive(result, b"").await.unwrap_err();

        assert_eq!(err.to_string(), "stream closed by server");
        assert!(!dir.path().join("client_id").exists());
    }
}
