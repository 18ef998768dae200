//! Tinkerbell templates and the objects that reference them
//!
//! Templates are rendered to YAML from typed structs; workflows and hardware
//! are built as CRD objects ready for creation.

use super::DeviceInfo;
use super::names;
use crate::config::Config;
use crate::error::ProvisioningError;
use crds::{
    DEVICE_SLOT, Dhcp, Disk, Hardware, HardwareMetadata, HardwareSpec, Interface, Ip, MetadataFacility,
    MetadataInstance, MetadataOperatingSystem, Netboot, Template, TemplateSpec, Workflow, WorkflowSpec,
};
use inventory_client::SecurityFeature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ACTION_STORE_ALPINE: &str = "store-Alpine";
pub const ACTION_RUN_FDO: &str = "run-fdo";
pub const ACTION_ERASE_NON_REMOVABLE_DISK: &str = "erase-non-removable-disk";
pub const ACTION_SECURE_BOOT_STATUS_FLAG_READ: &str = "secure-boot-status-flag-read";
pub const ACTION_STREAM_OS_IMAGE: &str = "stream-os-image";
pub const ACTION_INSTALL_SCRIPT_DOWNLOAD: &str = "profile-pkg-and-node-agents-install-script-download";
pub const ACTION_EFIBOOTSET: &str = "efibootset-for-diskboot";
pub const ACTION_FDE_ENCRYPTION: &str = "fde-encryption";
pub const ACTION_REBOOT: &str = "reboot";

const TEMPLATE_VERSION: &str = "0.1";
const WORKER: &str = "{{.device_1}}";
const DI_GLOBAL_TIMEOUT: u64 = 8000;
const PROD_GLOBAL_TIMEOUT: u64 = 9800;
const REBOOT_GLOBAL_TIMEOUT: u64 = 300;

const LEASE_TIME: i64 = 86400;
const NETMASK: &str = "255.255.255.0";
const OS_DISTRO: &str = "ubuntu";
const OS_VERSION: &str = "22.04";
const FACILITY: &str = "onboarding";
const ARCH: &str = "x86_64";

/// Where action images come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSettings {
    pub registry: String,
    pub version: String,
    pub fdo_mfg_url: String,
}

impl TemplateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            registry: config.tinker_actions_registry.clone(),
            version: config.tinker_action_version.clone(),
            fdo_mfg_url: config.fdo_mfg_url.clone(),
        }
    }

    /// `<registry>/<image>:<version>`
    fn image(&self, image: &str) -> String {
        format!("{}/{}:{}", self.registry.trim_end_matches('/'), image, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub version: String,
    pub name: String,
    pub global_timeout: u64,
    pub tasks: Vec<TaskTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub name: String,
    pub worker: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    pub actions: Vec<ActionTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub name: String,
    pub image: String,
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
}

impl ActionTemplate {
    fn new(name: &str, image: String, timeout: u64) -> Self {
        Self {
            name: name.to_string(),
            image,
            timeout,
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            pid: None,
        }
    }

    fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.environment.insert(key.to_string(), value.into());
        self
    }

    fn volume(mut self, volume: &str) -> Self {
        self.volumes.push(volume.to_string());
        self
    }

    fn host_pid(mut self) -> Self {
        self.pid = Some("host".to_string());
        self
    }
}

fn device_volumes() -> Vec<String> {
    vec![
        "/dev:/dev".to_string(),
        "/dev/console:/dev/console".to_string(),
        "/lib/firmware:/lib/firmware:ro".to_string(),
    ]
}

fn reboot_action(settings: &TemplateSettings) -> ActionTemplate {
    ActionTemplate::new(ACTION_REBOOT, settings.image("reboot"), 90)
        .volume("/worker:/worker")
        .host_pid()
}

fn render(template: &WorkflowTemplate) -> Result<String, ProvisioningError> {
    serde_yaml::to_string(template)
        .map_err(|e| ProvisioningError::Workflow(format!("Failed to render template {}: {}", template.name, e)))
}

/// Device initialization: store the DI environment and run the FDO client in DI mode
pub fn di_template_data(device: &DeviceInfo, settings: &TemplateSettings) -> Result<String, ProvisioningError> {
    render(&WorkflowTemplate {
        version: TEMPLATE_VERSION.to_string(),
        name: names::di_template_name(&device.guid),
        global_timeout: DI_GLOBAL_TIMEOUT,
        tasks: vec![TaskTemplate {
            name: "os-installation-di".to_string(),
            worker: WORKER.to_string(),
            volumes: device_volumes(),
            actions: vec![
                ActionTemplate::new(ACTION_STORE_ALPINE, settings.image("store_alpine"), 500)
                    .env("BLOCK_DEVICE", &device.disk_device)
                    .env("PARTITION_SZ", "500MB"),
                ActionTemplate::new(ACTION_RUN_FDO, settings.image("fdoclient_action"), 400)
                    .env("DATA_PARTITION_LBL", "CREDS")
                    .env("FDO_RUN_TYPE", "di")
                    .env("FDO_MFG_URL", &settings.fdo_mfg_url)
                    .env("DEVICE_SERIAL", &device.hw_serial)
                    .env("FDO_TLS", "https"),
                reboot_action(settings),
            ],
        }],
    })
}

/// A single reboot, used between device initialization and OS installation
pub fn reboot_template_data(device: &DeviceInfo, settings: &TemplateSettings) -> Result<String, ProvisioningError> {
    render(&WorkflowTemplate {
        version: TEMPLATE_VERSION.to_string(),
        name: names::reboot_template_name(&device.guid),
        global_timeout: REBOOT_GLOBAL_TIMEOUT,
        tasks: vec![TaskTemplate {
            name: "reboot".to_string(),
            worker: WORKER.to_string(),
            volumes: device_volumes(),
            actions: vec![reboot_action(settings)],
        }],
    })
}

/// OS installation
pub fn prod_template_data(device: &DeviceInfo, settings: &TemplateSettings) -> Result<String, ProvisioningError> {
    let mut actions = vec![
        ActionTemplate::new(
            ACTION_ERASE_NON_REMOVABLE_DISK,
            settings.image("erase_non_removable_disks"),
            1800,
        )
        .host_pid(),
        ActionTemplate::new(
            ACTION_SECURE_BOOT_STATUS_FLAG_READ,
            settings.image("securebootflag"),
            300,
        )
        .env(
            "ENABLE_SECURE_BOOT",
            (device.security_feature == SecurityFeature::SecureBootAndFullDiskEncryption).to_string(),
        )
        .volume("/:/host:rw"),
        ActionTemplate::new(ACTION_STREAM_OS_IMAGE, settings.image("image2disk"), 9600)
            .env("IMG_URL", &device.os_image_url)
            .env("SHA256", &device.os_image_sha256)
            .env("DEST_DISK", &device.disk_device)
            .env("COMPRESSED", "true"),
        ActionTemplate::new(ACTION_INSTALL_SCRIPT_DOWNLOAD, settings.image("writefile"), 300)
            .env("DEST_DISK", &device.disk_device)
            .env("FS_TYPE", "ext4")
            .env("DEST_PATH", "/home/postinstall/Setup/installer.sh")
            .env("SCRIPT_URL", &device.overlay_script_url)
            .env("HOSTNAME", &device.hostname)
            .env("MODE", "0755"),
        ActionTemplate::new(ACTION_EFIBOOTSET, settings.image("efibootset"), 300).host_pid(),
    ];
    if device.security_feature == SecurityFeature::SecureBootAndFullDiskEncryption {
        actions.push(
            ActionTemplate::new(ACTION_FDE_ENCRYPTION, settings.image("fde_dmv"), 560)
                .env("DEST_DISK", &device.disk_device)
                .host_pid(),
        );
    }
    actions.push(reboot_action(settings));

    render(&WorkflowTemplate {
        version: TEMPLATE_VERSION.to_string(),
        name: names::prod_template_name(&device.img_type, &device.guid),
        global_timeout: PROD_GLOBAL_TIMEOUT,
        tasks: vec![TaskTemplate {
            name: "os-installation".to_string(),
            worker: WORKER.to_string(),
            volumes: device_volumes(),
            actions,
        }],
    })
}

pub fn new_template(name: &str, data: String) -> Template {
    Template::new(name, TemplateSpec { data: Some(data) })
}

/// Workflow binding `template` to the device hardware
pub fn new_workflow(name: &str, template: &str, device: &DeviceInfo) -> Workflow {
    Workflow::new(
        name,
        WorkflowSpec {
            template_ref: template.to_string(),
            hardware_ref: names::hardware_name(&device.guid),
            hardware_map: BTreeMap::from([(DEVICE_SLOT.to_string(), device.hw_mac.clone())]),
        },
    )
}

/// Netbootable hardware for the device; the OS resource ID travels as `os_slug`
pub fn new_hardware(device: &DeviceInfo) -> Hardware {
    let name = names::hardware_name(&device.guid);
    Hardware::new(
        &name,
        HardwareSpec {
            disks: vec![Disk {
                device: device.disk_device.clone(),
            }],
            metadata: Some(HardwareMetadata {
                facility: Some(MetadataFacility {
                    facility_code: FACILITY.to_string(),
                }),
                instance: Some(MetadataInstance {
                    id: device.hw_mac.clone(),
                    hostname: name.clone(),
                    operating_system: Some(MetadataOperatingSystem {
                        distro: OS_DISTRO.to_string(),
                        os_slug: device.os_resource_id.clone(),
                        version: OS_VERSION.to_string(),
                    }),
                }),
            }),
            interfaces: vec![Interface {
                netboot: Some(Netboot {
                    allow_pxe: true,
                    allow_workflow: true,
                }),
                dhcp: Some(Dhcp {
                    mac: device.hw_mac.clone(),
                    hostname: name.clone(),
                    arch: ARCH.to_string(),
                    uefi: true,
                    lease_time: LEASE_TIME,
                    ip: Some(Ip {
                        address: device.hw_ip.clone(),
                        gateway: String::new(),
                        netmask: NETMASK.to_string(),
                    }),
                }),
            }],
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_client::OsType;

    fn device(security_feature: SecurityFeature) -> DeviceInfo {
        DeviceInfo {
            guid: "guid-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            hw_serial: "SN1".to_string(),
            hw_mac: "aa:bb:cc:dd:ee:ff".to_string(),
            hw_ip: "10.0.0.5".to_string(),
            hostname: "host-1".to_string(),
            disk_device: "/dev/nvme0n1".to_string(),
            os_resource_id: "os-1".to_string(),
            os_type: OsType::Mutable,
            os_image_url: "http://files/os.raw.gz".to_string(),
            os_image_sha256: "abc123".to_string(),
            overlay_script_url: "http://files/overlay.sh".to_string(),
            img_type: "prod_bkc".to_string(),
            security_feature,
        }
    }

    fn settings() -> TemplateSettings {
        TemplateSettings {
            registry: "registry.local/tinker-actions/".to_string(),
            version: "v1.2.3".to_string(),
            fdo_mfg_url: "http://mfg:8039".to_string(),
        }
    }

    fn parse(data: &str) -> WorkflowTemplate {
        serde_yaml::from_str(data).unwrap()
    }

    fn action_names(template: &WorkflowTemplate) -> Vec<&str> {
        template.tasks[0].actions.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn test_di_template() {
        let template = parse(&di_template_data(&device(SecurityFeature::None), &settings()).unwrap());
        assert_eq!(template.name, "fdodi-guid-1");
        assert_eq!(template.global_timeout, 8000);
        assert_eq!(template.tasks[0].worker, "{{.device_1}}");
        assert_eq!(action_names(&template), vec!["store-Alpine", "run-fdo", "reboot"]);

        let fdo = &template.tasks[0].actions[1];
        assert_eq!(fdo.environment["FDO_RUN_TYPE"], "di");
        assert_eq!(fdo.environment["DEVICE_SERIAL"], "SN1");
        assert_eq!(fdo.image, "registry.local/tinker-actions/fdoclient_action:v1.2.3");
    }

    #[test]
    fn test_reboot_template() {
        let template = parse(&reboot_template_data(&device(SecurityFeature::None), &settings()).unwrap());
        assert_eq!(template.name, "reboot-guid-1");
        assert_eq!(action_names(&template), vec!["reboot"]);
    }

    #[test]
    fn test_prod_template_without_fde() {
        let template = parse(&prod_template_data(&device(SecurityFeature::None), &settings()).unwrap());
        assert_eq!(template.name, "prod-bkc-guid-1-prod");
        assert_eq!(
            action_names(&template),
            vec![
                "erase-non-removable-disk",
                "secure-boot-status-flag-read",
                "stream-os-image",
                "profile-pkg-and-node-agents-install-script-download",
                "efibootset-for-diskboot",
                "reboot",
            ]
        );
        let stream = &template.tasks[0].actions[2];
        assert_eq!(stream.environment["IMG_URL"], "http://files/os.raw.gz");
        assert_eq!(stream.environment["SHA256"], "abc123");
        assert_eq!(stream.environment["DEST_DISK"], "/dev/nvme0n1");
    }

    #[test]
    fn test_prod_template_with_fde() {
        let template = parse(
            &prod_template_data(&device(SecurityFeature::SecureBootAndFullDiskEncryption), &settings()).unwrap(),
        );
        let names = action_names(&template);
        assert_eq!(names[names.len() - 2], "fde-encryption");
        assert_eq!(names[names.len() - 1], "reboot");
    }

    #[test]
    fn test_workflow_and_hardware_objects() {
        let device = device(SecurityFeature::None);
        let wf = new_workflow("workflow-guid-1-prod", "prod-bkc-guid-1-prod", &device);
        assert_eq!(wf.spec.hardware_ref, "machine-guid-1");
        assert_eq!(wf.spec.hardware_map[DEVICE_SLOT], "aa:bb:cc:dd:ee:ff");

        let hw = new_hardware(&device);
        assert_eq!(hw.metadata.name.as_deref(), Some("machine-guid-1"));
        let instance = hw.spec.metadata.as_ref().unwrap().instance.as_ref().unwrap();
        assert_eq!(instance.id, "aa:bb:cc:dd:ee:ff");
        assert_eq!(instance.operating_system.as_ref().unwrap().os_slug, "os-1");
        let dhcp = hw.spec.interfaces[0].dhcp.as_ref().unwrap();
        assert_eq!(dhcp.hostname, "machine-guid-1");
        assert_eq!(dhcp.lease_time, 86400);
        assert_eq!(dhcp.ip.as_ref().unwrap().netmask, "255.255.255.0");
        assert!(hw.spec.interfaces[0].netboot.as_ref().unwrap().allow_pxe);
    }
}
