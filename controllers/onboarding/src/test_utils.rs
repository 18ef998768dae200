//! Test utilities for unit testing reconcilers
//!
//! Fixtures for inventory resources and device snapshots, plus a harness that
//! wires every reconciler against in-memory mocks.

use crate::artifacts::mock::MockArtifactResolver;
use crate::config::Config;
use crate::engine::ReconcileId;
use crate::handshake::OwnershipHandshake;
use crate::reconciler::{HostReconciler, InstanceReconciler, OsReconciler};
use crate::workflow::client::mock::MockWorkflowClient;
use crate::workflow::template_data::TemplateSettings;
use crate::workflow::{DeviceInfo, WorkflowOrchestrator};
use auth_service::MockAuthService;
use fdo_client::MockFdoClient;
use inventory_client::{
    Host, HostState, Instance, InstanceState, MockInventoryClient, OperatingSystem, OsProviderKind, OsType,
    SecurityFeature,
};
use std::sync::Arc;

pub const TENANT: &str = "tenant-1";
pub const HOST_ID: &str = "host-1a2b3c4d";
pub const INSTANCE_ID: &str = "inst-1a2b3c4d";
pub const OS_ID: &str = "os-1a2b3c4d";
pub const GUID: &str = "4c4c4544-0035-3010-8030-b2c04f4a4633";
pub const SERIAL: &str = "SN12345";
pub const REPO_URL: &str = "http://files/ubuntu-22.04.raw.gz;http://files/installer.sh";

/// Identity of a resource in the test tenant
pub fn reconcile_id(resource_id: &str) -> ReconcileId {
    ReconcileId {
        tenant_id: TENANT.to_string(),
        resource_id: resource_id.to_string(),
    }
}

/// Helper to create a test host in the given states
pub fn create_test_host(desired: HostState, current: HostState) -> Host {
    Host {
        resource_id: HOST_ID.to_string(),
        tenant_id: TENANT.to_string(),
        name: "edge-node-1".to_string(),
        uuid: GUID.to_string(),
        serial_number: SERIAL.to_string(),
        pxe_mac: "aa:bb:cc:dd:ee:ff".to_string(),
        bmc_ip: "10.0.0.5".to_string(),
        desired_state: desired,
        current_state: current,
        ..Host::default()
    }
}

/// Helper to create a test OS resource with the given repo URL
pub fn create_test_os(repo_url: &str) -> OperatingSystem {
    OperatingSystem {
        resource_id: OS_ID.to_string(),
        tenant_id: TENANT.to_string(),
        name: "ubuntu-22.04-lts-generic".to_string(),
        architecture: "x86_64".to_string(),
        os_type: OsType::Mutable,
        os_provider: OsProviderKind::Infra,
        image_url: "ubuntu-22.04.raw.gz".to_string(),
        sha256: "abc123".to_string(),
        profile_name: "ubuntu-22.04-lts-generic".to_string(),
        repo_url: repo_url.to_string(),
    }
}

/// Helper to create a test instance with its host and desired OS eager-loaded
pub fn create_test_instance(desired: InstanceState, current: InstanceState) -> Instance {
    Instance {
        resource_id: INSTANCE_ID.to_string(),
        tenant_id: TENANT.to_string(),
        name: "instance-1".to_string(),
        desired_state: desired,
        current_state: current,
        security_feature: SecurityFeature::None,
        host: Some(Box::new(create_test_host(HostState::Onboarded, HostState::Onboarded))),
        desired_os: Some(create_test_os(REPO_URL)),
        ..Instance::default()
    }
}

pub fn create_test_device() -> DeviceInfo {
    DeviceInfo::from_instance(
        &create_test_instance(InstanceState::Running, InstanceState::Unspecified),
        &Config::default(),
    )
    .unwrap()
}

pub fn test_config(enable_device_initialization: bool) -> Config {
    Config {
        enable_device_initialization,
        keycloak_client_secret: "secret".to_string(),
        ..Config::default()
    }
}

/// Every mock a reconciler can touch
#[derive(Clone, Default)]
pub struct Mocks {
    pub inventory: MockInventoryClient,
    pub workflows: MockWorkflowClient,
    pub auth: MockAuthService,
    pub fdo: MockFdoClient,
    pub artifacts: MockArtifactResolver,
}

impl Mocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orchestrator(&self, config: &Config) -> Arc<WorkflowOrchestrator> {
        Arc::new(WorkflowOrchestrator::new(
            Arc::new(self.workflows.clone()),
            Arc::new(self.auth.clone()),
            TemplateSettings::from_config(config),
            config.enable_device_initialization,
            config.disable_credentials_management,
        ))
    }

    pub fn handshake(&self, config: &Config) -> Arc<OwnershipHandshake> {
        Arc::new(OwnershipHandshake::new(
            Arc::new(self.fdo.clone()),
            Arc::new(self.auth.clone()),
            config.enable_device_initialization,
        ))
    }

    pub fn host_reconciler(&self, config: &Config) -> HostReconciler {
        HostReconciler::new(
            Arc::new(self.inventory.clone()),
            Arc::new(self.auth.clone()),
            config.disable_credentials_management,
        )
    }

    pub fn instance_reconciler(&self, config: &Config) -> InstanceReconciler {
        InstanceReconciler::new(
            Arc::new(self.inventory.clone()),
            self.orchestrator(config),
            self.handshake(config),
            Arc::new(config.clone()),
        )
    }

    pub fn os_reconciler(&self) -> OsReconciler {
        OsReconciler::new(Arc::new(self.inventory.clone()), Arc::new(self.artifacts.clone()))
    }
}
