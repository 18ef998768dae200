//! FDO ownership handshake
//!
//! Extends the device ownership voucher to this owner, then waits for the
//! device to complete TO2. Until it does, the device credentials are staged
//! on the owner service and a service-info (SVI) instruction is queued so the
//! device receives them during TO2.

use crate::error::ProvisioningError;
use crate::status;
use crate::workflow::DeviceInfo;
use auth_service::{AuthError, AuthService, Credentials};
use fdo_client::{CLIENT_ID_SUFFIX, CLIENT_SECRET_SUFFIX, FdoClientTrait, owner_resource_name, svi_payload};
use inventory_client::Instance;
use std::sync::Arc;
use tracing::{debug, info};

/// Fetch the device credentials, creating them when none exist
pub async fn ensure_credentials(
    auth: &dyn AuthService,
    tenant_id: &str,
    uuid: &str,
) -> Result<Credentials, AuthError> {
    match auth.get_credentials(tenant_id, uuid).await {
        Ok(credentials) => Ok(credentials),
        Err(e) if e.is_not_found() => {
            info!("Creating credentials for device {}", uuid);
            auth.create_credentials(tenant_id, uuid).await
        }
        Err(e) => Err(e),
    }
}

pub struct OwnershipHandshake {
    fdo: Arc<dyn FdoClientTrait>,
    auth: Arc<dyn AuthService>,
    enabled: bool,
}

impl std::fmt::Debug for OwnershipHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipHandshake")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl OwnershipHandshake {
    /// `enabled` follows device initialization; without DI there is no voucher
    pub fn new(fdo: Arc<dyn FdoClientTrait>, auth: Arc<dyn AuthService>, enabled: bool) -> Self {
        Self { fdo, auth, enabled }
    }

    /// `Ok` once TO2 completed for the device, "in progress" while waiting for it
    ///
    /// Marks the host "Onboarded" on completion.
    pub async fn check_to2_status_or_run_fdo_actions(
        &self,
        device: &DeviceInfo,
        instance: &mut Instance,
    ) -> Result<(), ProvisioningError> {
        if !self.enabled {
            return Ok(());
        }

        let guid = self.fdo.do_voucher_extension(&device.hw_serial).await?;
        debug!("Device {} has FDO GUID {}", device.guid, guid);

        let completed = self.fdo.get_to2_state(&guid).await?;
        if completed.is_some_and(|on| !on.is_empty()) {
            info!("TO2 completed for device {}", device.guid);
            if let Some(host) = instance.host.as_deref_mut() {
                status::set_onboarding_status(host, &status::onboarding_done());
            }
            return Ok(());
        }

        if let Some(host) = instance.host.as_deref_mut() {
            status::set_onboarding_status(host, &status::onboarding_in_progress());
        }

        let credentials = ensure_credentials(self.auth.as_ref(), &device.tenant_id, &device.guid).await?;
        self.fdo
            .send_file_to_owner(&owner_resource_name(&guid, CLIENT_ID_SUFFIX), &credentials.client_id)
            .await?;
        self.fdo
            .send_file_to_owner(
                &owner_resource_name(&guid, CLIENT_SECRET_SUFFIX),
                &credentials.client_secret,
            )
            .await?;
        self.fdo
            .execute_svi(&svi_payload(CLIENT_ID_SUFFIX, CLIENT_SECRET_SUFFIX))
            .await?;

        Err(ProvisioningError::in_progress(format!(
            "waiting for TO2 to complete for device {}",
            device.guid
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_service::MockAuthService;
    use fdo_client::MockFdoClient;
    use inventory_client::{Host, OsType, SecurityFeature};

    fn device() -> DeviceInfo {
        DeviceInfo {
            guid: "guid-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            hw_serial: "SN1".to_string(),
            hw_mac: "aa:bb:cc:dd:ee:ff".to_string(),
            hw_ip: "10.0.0.5".to_string(),
            hostname: "host-1".to_string(),
            disk_device: "/dev/sda".to_string(),
            os_resource_id: "os-1".to_string(),
            os_type: OsType::Mutable,
            os_image_url: "http://files/os.raw.gz".to_string(),
            os_image_sha256: String::new(),
            overlay_script_url: "http://files/overlay.sh".to_string(),
            img_type: "prod_bkc".to_string(),
            security_feature: SecurityFeature::None,
        }
    }

    fn instance() -> Instance {
        Instance {
            host: Some(Box::new(Host::default())),
            ..Instance::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_is_a_no_op() {
        let fdo = MockFdoClient::new();
        let handshake = OwnershipHandshake::new(Arc::new(fdo.clone()), Arc::new(MockAuthService::new()), false);

        handshake
            .check_to2_status_or_run_fdo_actions(&device(), &mut instance())
            .await
            .unwrap();
        assert!(fdo.voucher_calls().is_empty());
    }

    #[tokio::test]
    async fn test_pending_to2_stages_credentials_and_svi() {
        let fdo = MockFdoClient::new();
        let auth = MockAuthService::new();
        let handshake = OwnershipHandshake::new(Arc::new(fdo.clone()), Arc::new(auth.clone()), true);
        let mut instance = instance();

        let err = handshake
            .check_to2_status_or_run_fdo_actions(&device(), &mut instance)
            .await
            .unwrap_err();

        assert!(err.is_in_progress());
        assert_eq!(fdo.voucher_calls(), vec!["SN1"]);
        assert_eq!(auth.created(), vec!["guid-1"]);
        assert_eq!(fdo.file("fdo-SN1_client_id").as_deref(), Some("edgenode-guid-1"));
        assert_eq!(fdo.file("fdo-SN1_client_secret").as_deref(), Some("secret-guid-1"));
        assert_eq!(fdo.svi_payloads().len(), 1);
        assert_eq!(
            instance.host.unwrap().onboarding_status,
            status::ONBOARDING_IN_PROGRESS
        );
    }

    #[tokio::test]
    async fn test_existing_credentials_are_reused() {
        let fdo = MockFdoClient::new();
        let auth = MockAuthService::new();
        auth.add_credentials("guid-1", "kept");
        let handshake = OwnershipHandshake::new(Arc::new(fdo.clone()), Arc::new(auth.clone()), true);

        let _ = handshake
            .check_to2_status_or_run_fdo_actions(&device(), &mut instance())
            .await;

        assert!(auth.created().is_empty());
        assert_eq!(fdo.file("fdo-SN1_client_secret").as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_completed_to2_marks_host_onboarded() {
        let fdo = MockFdoClient::new();
        fdo.complete_to2("SN1");
        let handshake = OwnershipHandshake::new(Arc::new(fdo.clone()), Arc::new(MockAuthService::new()), true);
        let mut instance = instance();

        handshake
            .check_to2_status_or_run_fdo_actions(&device(), &mut instance)
            .await
            .unwrap();

        assert!(fdo.svi_payloads().is_empty());
        assert_eq!(instance.host.unwrap().onboarding_status, status::ONBOARDED);
    }

    #[tokio::test]
    async fn test_voucher_failure_is_retryable() {
        let fdo = MockFdoClient::new();
        fdo.set_fail_voucher(true);
        let handshake = OwnershipHandshake::new(Arc::new(fdo), Arc::new(MockAuthService::new()), true);

        let err = handshake
            .check_to2_status_or_run_fdo_actions(&device(), &mut instance())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisioningError::Fdo(_)));
        assert!(err.is_classified());
    }
}
