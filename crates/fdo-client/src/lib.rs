//! FIDO Device Onboard (FDO) client
//!
//! Talks to the FDO owner and manufacturer services to extend a device's
//! ownership voucher, stage service-info files for the device and track the
//! TO2 (transfer ownership) protocol.

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod fdo_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::FdoClient;
pub use error::FdoError;
pub use fdo_trait::FdoClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockFdoClient;

/// Suffix of the owner resource holding a device's client ID
pub const CLIENT_ID_SUFFIX: &str = "client_id";
/// Suffix of the owner resource holding a device's client secret
pub const CLIENT_SECRET_SUFFIX: &str = "client_secret";

/// Owner resource name for a file staged for the device with FDO GUID `guid`
#[must_use]
pub fn owner_resource_name(guid: &str, suffix: &str) -> String {
    format!("{guid}_{suffix}")
}

/// Service-info payload asking the owner to deliver the staged credential files
#[must_use]
pub fn svi_payload(client_id_suffix: &str, client_secret_suffix: &str) -> String {
    format!(
        r#"[{{"filedesc" : "client_id","resource" : "$(guid)_{client_id_suffix}"}},{{"filedesc" : "client_secret","resource" : "$(guid)_{client_secret_suffix}"}}]"#
    )
}
