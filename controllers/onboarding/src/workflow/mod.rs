//! Tinkerbell workflow orchestration
//!
//! Everything needed to take a device from "known to the inventory" to "OS
//! installed": the [`DeviceInfo`] snapshot a provisioning run works from, the
//! names and templates of the Kubernetes objects it creates, and the
//! [`WorkflowOrchestrator`](orchestrator::WorkflowOrchestrator) driving them.

pub mod client;
pub mod names;
pub mod orchestrator;
pub mod status_detail;
pub mod template_data;

#[cfg(test)]
mod orchestrator_test;

use crate::config::Config;
use crate::error::ProvisioningError;
use inventory_client::{Instance, OsType, SecurityFeature};

pub use client::KubeWorkflowClient;
pub use orchestrator::WorkflowOrchestrator;

/// Image type used for immutable OS images
pub const IMMUTABLE_IMG_TYPE: &str = "tiber-os";

/// Separator between the OS image URL and the overlay script URL in `repo_url`
pub const REPO_URL_SEPARATOR: char = ';';

/// Everything a provisioning run needs to know about one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Host UUID; every Tinkerbell object name derives from it
    pub guid: String,
    pub tenant_id: String,
    pub hw_serial: String,
    pub hw_mac: String,
    pub hw_ip: String,
    pub hostname: String,
    pub disk_device: String,

    pub os_resource_id: String,
    pub os_type: OsType,
    pub os_image_url: String,
    pub os_image_sha256: String,
    pub overlay_script_url: String,
    pub img_type: String,
    pub security_feature: SecurityFeature,
}

impl DeviceInfo {
    /// Build the device snapshot from an instance with its host and desired OS loaded
    ///
    /// Fails with [`ProvisioningError::Malformed`] when the instance lacks a host
    /// or OS, or when the OS `repo_url` is not `"<os_url>;<overlay_url>"`.
    pub fn from_instance(instance: &Instance, config: &Config) -> Result<Self, ProvisioningError> {
        let host = instance.host.as_deref().ok_or_else(|| {
            ProvisioningError::Malformed(format!("Instance {} has no host", instance.resource_id))
        })?;
        let os = instance.desired_os.as_ref().ok_or_else(|| {
            ProvisioningError::Malformed(format!("Instance {} has no desired OS", instance.resource_id))
        })?;

        let (os_image_url, overlay_script_url) = split_repo_url(&os.repo_url).ok_or_else(|| {
            ProvisioningError::Malformed(format!(
                "Invalid repo URL '{}' for OS {}",
                os.repo_url, os.resource_id
            ))
        })?;

        let img_type = match os.os_type {
            OsType::Immutable => IMMUTABLE_IMG_TYPE.to_string(),
            _ => config.img_type.clone(),
        };

        Ok(Self {
            guid: host.uuid.clone(),
            tenant_id: instance.tenant_id.clone(),
            hw_serial: host.serial_number.clone(),
            hw_mac: host.pxe_mac.clone(),
            hw_ip: host.bmc_ip.clone(),
            hostname: host.resource_id.clone(),
            disk_device: config.disk_device.clone(),
            os_resource_id: os.resource_id.clone(),
            os_type: os.os_type,
            os_image_url,
            os_image_sha256: os.sha256.clone(),
            overlay_script_url,
            img_type,
            security_feature: instance.security_feature,
        })
    }
}

/// Split `"<os_url>;<overlay_url>"`; both parts must be present
fn split_repo_url(repo_url: &str) -> Option<(String, String)> {
    let mut parts = repo_url.split(REPO_URL_SEPARATOR);
    let os_url = parts.next()?.trim();
    let overlay_url = parts.next()?.trim();
    if parts.next().is_some() || os_url.is_empty() || overlay_url.is_empty() {
        return None;
    }
    Some((os_url.to_string(), overlay_url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_client::{Host, OperatingSystem};

    fn instance(repo_url: &str, os_type: OsType) -> Instance {
        Instance {
            resource_id: "inst-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            host: Some(Box::new(Host {
                resource_id: "host-1".to_string(),
                uuid: "guid-1".to_string(),
                serial_number: "SN1".to_string(),
                pxe_mac: "aa:bb:cc:dd:ee:ff".to_string(),
                bmc_ip: "10.0.0.5".to_string(),
                ..Host::default()
            })),
            desired_os: Some(OperatingSystem {
                resource_id: "os-1".to_string(),
                os_type,
                sha256: "abc123".to_string(),
                repo_url: repo_url.to_string(),
                ..OperatingSystem::default()
            }),
            ..Instance::default()
        }
    }

    #[test]
    fn test_from_instance() {
        let config = Config::default();
        let info = DeviceInfo::from_instance(
            &instance("http://files/os.raw.gz;http://files/overlay.sh", OsType::Mutable),
            &config,
        )
        .unwrap();

        assert_eq!(info.guid, "guid-1");
        assert_eq!(info.hostname, "host-1");
        assert_eq!(info.hw_mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(info.hw_ip, "10.0.0.5");
        assert_eq!(info.os_image_url, "http://files/os.raw.gz");
        assert_eq!(info.overlay_script_url, "http://files/overlay.sh");
        assert_eq!(info.img_type, "prod_bkc");
        assert_eq!(info.disk_device, "/dev/sda");
    }

    #[test]
    fn test_immutable_os_uses_own_image_type() {
        let info = DeviceInfo::from_instance(&instance("a;b", OsType::Immutable), &Config::default()).unwrap();
        assert_eq!(info.img_type, IMMUTABLE_IMG_TYPE);
    }

    #[test]
    fn test_malformed_repo_url() {
        let config = Config::default();
        for repo_url in ["", "only-os-url", "a;", ";b", "a;b;c"] {
            let err = DeviceInfo::from_instance(&instance(repo_url, OsType::Mutable), &config).unwrap_err();
            assert!(!err.is_classified(), "{repo_url:?} should be malformed");
        }
    }

    #[test]
    fn test_missing_host_or_os() {
        let config = Config::default();

        let mut no_host = instance("a;b", OsType::Mutable);
        no_host.host = None;
        assert!(matches!(
            DeviceInfo::from_instance(&no_host, &config),
            Err(ProvisioningError::Malformed(_))
        ));

        let mut no_os = instance("a;b", OsType::Mutable);
        no_os.desired_os = None;
        assert!(matches!(
            DeviceInfo::from_instance(&no_os, &config),
            Err(ProvisioningError::Malformed(_))
        ));
    }
}
