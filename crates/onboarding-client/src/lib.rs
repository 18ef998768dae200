//! Device onboarding protocol client
//!
//! Device-side half of onboarding: registers the device with the onboarding
//! manager over the streaming (non-interactive) protocol and falls back to the
//! interactive, operator-authenticated path when the manager does not know the
//! device. Credentials and tokens end up in files under `/dev/shm` for the rest
//! of the boot environment.
//!
//! # Example
//!
//! ```no_run
//! use onboarding_client::{CredentialFiles, DeviceInfo, DiscoveryConfig, OnboardingController};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), onboarding_client::OnboardingError> {
//! let config = DiscoveryConfig {
//!     obm_svc: "obm.edge.example".to_string(),
//!     obs_svc: "obs.edge.example".to_string(),
//!     obm_port: 443,
//!     keycloak_url: "keycloak.edge.example".to_string(),
//!     device: DeviceInfo {
//!         mac: "aa:bb:cc:dd:ee:ff".to_string(),
//!         uuid: "4c4c4544-0035-3010-8030-b2c04f4a4633".to_string(),
//!         serial: "SN123".to_string(),
//!         ip: "10.0.0.5".to_string(),
//!     },
//!     ca_cert_path: "/etc/idp/server_cert.pem".into(),
//!     auth_script: Vec::new(),
//! };
//! OnboardingController::new(config, CredentialFiles::default())
//!     .execute(&CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod files;
pub mod interactive;
pub mod noninteractive;
pub mod proto;
pub mod sysinfo;
pub mod token;
pub mod transport;

pub use controller::{DiscoveryConfig, OnboardingController};
pub use error::OnboardingError;
pub use files::CredentialFiles;
pub use noninteractive::{RegistrationBackoff, StreamResult};
pub use transport::{NodeRegistrar, RegistrationStream};

use proto::{CreateNodesRequest, HwData, NodeData, OnboardNodeStreamRequest};

/// Default CA bundle for all onboarding endpoints
pub const DEFAULT_CA_CERT_PATH: &str = "/etc/idp/server_cert.pem";

/// Identity a device presents when registering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub mac: String,
    pub uuid: String,
    pub serial: String,
    pub ip: String,
}

impl DeviceInfo {
    pub fn stream_request(&self) -> OnboardNodeStreamRequest {
        OnboardNodeStreamRequest {
            mac_id: self.mac.clone(),
            uuid: self.uuid.clone(),
            serialnum: self.serial.clone(),
            host_ip: self.ip.clone(),
        }
    }

    pub fn create_nodes_request(&self) -> CreateNodesRequest {
        CreateNodesRequest {
            payload: vec![NodeData {
                hwdata: vec![HwData {
                    mac_id: self.mac.clone(),
                    sut_ip: self.ip.clone(),
                    uuid: self.uuid.clone(),
                    serialnum: self.serial.clone(),
                }],
            }],
        }
    }
}
