//! Hardware CRD
//!
//! Describes a netbootable machine for Tinkerbell: its disks, DHCP identity and
//! the metadata handed to actions.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "tinkerbell.org",
    version = "v1alpha1",
    kind = "Hardware",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSpec {
    #[serde(default)]
    pub disks: Vec<Disk>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HardwareMetadata>,

    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    /// Block device path, e.g. `/dev/sda`
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardwareMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<MetadataFacility>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<MetadataInstance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetadataFacility {
    pub facility_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetadataInstance {
    pub id: String,
    pub hostname: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<MetadataOperatingSystem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetadataOperatingSystem {
    #[serde(default)]
    pub distro: String,

    /// Inventory OS resource ID
    #[serde(default)]
    pub os_slug: String,

    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netboot: Option<Netboot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<Dhcp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Netboot {
    #[serde(default, rename = "allowPXE")]
    pub allow_pxe: bool,

    #[serde(default)]
    pub allow_workflow: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub struct Dhcp {
    pub mac: String,

    #[serde(default)]
    pub hostname: String,

    #[serde(default)]
    pub arch: String,

    #[serde(default)]
    pub uefi: bool,

    #[serde(default)]
    pub lease_time: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ip>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Ip {
    pub address: String,

    #[serde(default)]
    pub gateway: String,

    #[serde(default)]
    pub netmask: String,
}
