//! Inventory resource models
//!
//! Every resource carries a `resource_id` whose prefix (`host-`, `inst-`, `os-`, ...)
//! identifies its kind, and the `tenant_id` that owns it.

use crate::error::InventoryError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an inventory resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Host,
    Instance,
    Os,
    HostNic,
    IpAddress,
    HostStorage,
    HostUsb,
    HostGpu,
    Provider,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        Self::Host,
        Self::Instance,
        Self::Os,
        Self::HostNic,
        Self::IpAddress,
        Self::HostStorage,
        Self::HostUsb,
        Self::HostGpu,
        Self::Provider,
    ];

    /// Resource ID prefix (without the trailing `-`)
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Instance => "inst",
            Self::Os => "os",
            Self::HostNic => "hostnic",
            Self::IpAddress => "ipaddr",
            Self::HostStorage => "hoststorage",
            Self::HostUsb => "hostusb",
            Self::HostGpu => "hostgpu",
            Self::Provider => "provider",
        }
    }

    /// Name used on the wire and in logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Instance => "instance",
            Self::Os => "os",
            Self::HostNic => "host_nic",
            Self::IpAddress => "ip_address",
            Self::HostStorage => "host_storage",
            Self::HostUsb => "host_usb",
            Self::HostGpu => "host_gpu",
            Self::Provider => "provider",
        }
    }

    /// Derive the kind from a resource ID such as `host-1a2b3c4d`
    #[must_use]
    pub fn from_resource_id(resource_id: &str) -> Option<Self> {
        let (prefix, rest) = resource_id.split_once('-')?;
        if rest.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostState {
    #[default]
    Unspecified,
    Deleted,
    Error,
    Onboarded,
    Untrusted,
    Registered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    #[default]
    Unspecified,
    Running,
    Deleted,
    Error,
    Untrusted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusIndicator {
    #[default]
    Unspecified,
    Error,
    InProgress,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OsType {
    #[default]
    Unspecified,
    Mutable,
    Immutable,
}

/// Who provisions an OS; only `Infra` images are installed by the onboarding manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OsProviderKind {
    #[default]
    Unspecified,
    Infra,
    Lenovo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityFeature {
    #[default]
    Unspecified,
    None,
    SecureBootAndFullDiskEncryption,
}

/// A human readable status paired with its indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStatus {
    pub status: String,
    pub indicator: StatusIndicator,
}

impl ResourceStatus {
    pub fn new(status: impl Into<String>, indicator: StatusIndicator) -> Self {
        Self {
            status: status.into(),
            indicator,
        }
    }

    /// Same indicator, status rendered as `"<status>: <details>"`
    #[must_use]
    pub fn with_details(&self, details: &str) -> Self {
        Self {
            status: format!("{}: {}", self.status, details),
            indicator: self.indicator,
        }
    }
}

/// Reference to another resource by ID
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRef {
    pub resource_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provider {
    pub resource_id: String,
    pub tenant_id: String,
    pub name: String,
    pub provider_kind: String,
    pub api_endpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostNic {
    pub resource_id: String,
    pub tenant_id: String,
    pub device_name: String,
    pub mac_addr: String,
    pub host: Option<ResourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpAddress {
    pub resource_id: String,
    pub tenant_id: String,
    /// CIDR notation
    pub address: String,
    pub nic: Option<ResourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostStorage {
    pub resource_id: String,
    pub tenant_id: String,
    pub wwid: String,
    pub serial: String,
    pub capacity_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostUsb {
    pub resource_id: String,
    pub tenant_id: String,
    pub device_name: String,
    pub serial: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostGpu {
    pub resource_id: String,
    pub tenant_id: String,
    pub device_name: String,
    pub pci_id: String,
}

/// A physical or virtual edge device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub resource_id: String,
    pub tenant_id: String,
    pub name: String,
    pub uuid: String,
    pub serial_number: String,
    pub pxe_mac: String,
    pub bmc_ip: String,

    pub desired_state: HostState,
    pub current_state: HostState,

    pub host_status: String,
    pub host_status_indicator: StatusIndicator,
    pub host_status_timestamp: u64,
    /// Free-form progress detail, written without touching `host_status`
    pub host_status_detail: String,

    pub onboarding_status: String,
    pub onboarding_status_indicator: StatusIndicator,
    pub onboarding_status_timestamp: u64,

    pub provider: Option<Provider>,

    // Sub-resources, eager-loaded by the inventory
    pub host_nics: Vec<HostNic>,
    pub host_storages: Vec<HostStorage>,
    pub host_usbs: Vec<HostUsb>,
    pub host_gpus: Vec<HostGpu>,

    /// Instance currently scheduled on this host
    pub instance: Option<ResourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatingSystem {
    pub resource_id: String,
    pub tenant_id: String,
    pub name: String,
    pub architecture: String,
    pub os_type: OsType,
    pub os_provider: OsProviderKind,
    pub image_url: String,
    pub sha256: String,
    pub profile_name: String,
    /// Empty until resolved, then `"<os_url>;<overlay_url>"`
    pub repo_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instance {
    pub resource_id: String,
    pub tenant_id: String,
    pub name: String,

    pub desired_state: InstanceState,
    pub current_state: InstanceState,

    pub provisioning_status: String,
    pub provisioning_status_indicator: StatusIndicator,
    pub provisioning_status_timestamp: u64,

    pub security_feature: SecurityFeature,

    pub host: Option<Box<Host>>,
    pub desired_os: Option<OperatingSystem>,
    pub current_os: Option<OperatingSystem>,
}

/// Any inventory resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Host(Host),
    Instance(Instance),
    Os(OperatingSystem),
    HostNic(HostNic),
    IpAddress(IpAddress),
    HostStorage(HostStorage),
    HostUsb(HostUsb),
    HostGpu(HostGpu),
    Provider(Provider),
}

macro_rules! resource_variants {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        impl Resource {
            #[must_use]
            pub fn kind(&self) -> ResourceKind {
                match self {
                    $(Self::$variant(_) => ResourceKind::$variant,)+
                }
            }

            #[must_use]
            pub fn resource_id(&self) -> &str {
                match self {
                    $(Self::$variant(r) => &r.resource_id,)+
                }
            }

            #[must_use]
            pub fn tenant_id(&self) -> &str {
                match self {
                    $(Self::$variant(r) => &r.tenant_id,)+
                }
            }

            pub(crate) fn set_ids(&mut self, resource_id: &str, tenant_id: &str) {
                match self {
                    $(Self::$variant(r) => {
                        r.resource_id = resource_id.to_string();
                        r.tenant_id = tenant_id.to_string();
                    })+
                }
            }

            /// Serialize the inner resource without the kind tag
            pub fn to_value(&self) -> Result<serde_json::Value, InventoryError> {
                let value = match self {
                    $(Self::$variant(r) => serde_json::to_value(r)?,)+
                };
                Ok(value)
            }

            /// Rebuild a resource of `kind` from an untagged JSON value
            pub fn from_value(kind: ResourceKind, value: serde_json::Value) -> Result<Self, InventoryError> {
                let resource = match kind {
                    $(ResourceKind::$variant => Self::$variant(serde_json::from_value(value)?),)+
                };
                Ok(resource)
            }
        }

        $(
            impl From<$ty> for Resource {
                fn from(r: $ty) -> Self {
                    Self::$variant(r)
                }
            }

            impl TryFrom<Resource> for $ty {
                type Error = InventoryError;

                fn try_from(r: Resource) -> Result<Self, Self::Error> {
                    match r {
                        Resource::$variant(inner) => Ok(inner),
                        other => Err(InventoryError::UnexpectedKind {
                            expected: ResourceKind::$variant.as_str(),
                            actual: other.kind().as_str(),
                        }),
                    }
                }
            }
        )+
    };
}

resource_variants! {
    Host => Host,
    Instance => Instance,
    Os => OperatingSystem,
    HostNic => HostNic,
    IpAddress => IpAddress,
    HostStorage => HostStorage,
    HostUsb => HostUsb,
    HostGpu => HostGpu,
    Provider => Provider,
}

/// Identity of a resource across tenants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantResourceId {
    pub tenant_id: String,
    pub resource_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// Change notification delivered by a watch subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEvent {
    pub resource_id: String,
    pub tenant_id: String,
    pub kind: EventKind,
}

impl InventoryEvent {
    #[must_use]
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        ResourceKind::from_resource_id(&self.resource_id)
    }
}

/// Field names used in field masks and filters
pub mod fields {
    pub const RESOURCE_ID: &str = "resource_id";
    pub const CURRENT_STATE: &str = "current_state";

    pub const HOST_STATUS: &str = "host_status";
    pub const HOST_STATUS_INDICATOR: &str = "host_status_indicator";
    pub const HOST_STATUS_TIMESTAMP: &str = "host_status_timestamp";
    pub const HOST_STATUS_DETAIL: &str = "host_status_detail";
    pub const ONBOARDING_STATUS: &str = "onboarding_status";
    pub const ONBOARDING_STATUS_INDICATOR: &str = "onboarding_status_indicator";
    pub const ONBOARDING_STATUS_TIMESTAMP: &str = "onboarding_status_timestamp";

    pub const PROVISIONING_STATUS: &str = "provisioning_status";
    pub const PROVISIONING_STATUS_INDICATOR: &str = "provisioning_status_indicator";
    pub const PROVISIONING_STATUS_TIMESTAMP: &str = "provisioning_status_timestamp";

    pub const REPO_URL: &str = "repo_url";

    pub const NIC_RESOURCE_ID: &str = "nic.resource_id";
    pub const HOST_UUID: &str = "host.uuid";
}

/// Current time as a status timestamp (seconds since the epoch)
#[must_use]
pub fn now_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_resource_id() {
        assert_eq!(ResourceKind::from_resource_id("host-12345678"), Some(ResourceKind::Host));
        assert_eq!(ResourceKind::from_resource_id("inst-abcdef01"), Some(ResourceKind::Instance));
        assert_eq!(ResourceKind::from_resource_id("os-00000001"), Some(ResourceKind::Os));
        assert_eq!(ResourceKind::from_resource_id("hostnic-1"), Some(ResourceKind::HostNic));
        assert_eq!(ResourceKind::from_resource_id("host-"), None);
        assert_eq!(ResourceKind::from_resource_id("nodash"), None);
        assert_eq!(ResourceKind::from_resource_id("site-1"), None);
    }

    #[test]
    fn test_with_details() {
        let status = ResourceStatus::new("Deleting", StatusIndicator::InProgress);
        let detailed = status.with_details("waiting on inst-1 deletion");
        assert_eq!(detailed.status, "Deleting: waiting on inst-1 deletion");
        assert_eq!(detailed.indicator, StatusIndicator::InProgress);
    }

    #[test]
    fn test_try_from_wrong_kind() {
        let resource = Resource::from(OperatingSystem {
            resource_id: "os-1".to_string(),
            ..Default::default()
        });
        let err = Host::try_from(resource).unwrap_err();
        assert!(matches!(err, InventoryError::UnexpectedKind { expected: "host", actual: "os" }));
    }

    #[test]
    fn test_resource_value_round_trip_keeps_kind() {
        let host = Host {
            resource_id: "host-1".to_string(),
            tenant_id: "t1".to_string(),
            current_state: HostState::Onboarded,
            ..Default::default()
        };
        let value = Resource::from(host.clone()).to_value().unwrap();
        assert_eq!(value["current_state"], "ONBOARDED");
        let back = Resource::from_value(ResourceKind::Host, value).unwrap();
        assert_eq!(back, Resource::Host(host));
    }
}
