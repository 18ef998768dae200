//! Workflow orchestrator
//!
//! Drives the Tinkerbell side of provisioning for one device. Each step checks
//! whether its workflow exists; a missing workflow is created together with its
//! hardware and template and reported as "in progress", an existing one is
//! mapped from its state.
//!
//! Steps only mutate the instance (and its host) in memory. The instance
//! reconciler writes the changed statuses back once the run ends.

use super::client::WorkflowClient;
use super::status_detail::status_detail;
use super::template_data::{self, TemplateSettings};
use super::{DeviceInfo, names};
use crate::error::ProvisioningError;
use crate::handshake::ensure_credentials;
use crate::status;
use auth_service::AuthService;
use crds::{Workflow, WorkflowState};
use inventory_client::{Instance, InstanceState, OperatingSystem, ResourceStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Coarse outcome of a workflow state
enum Progress {
    Done,
    Failed,
    Running,
}

fn progress(workflow: &Workflow) -> Result<Progress, ProvisioningError> {
    match workflow.state() {
        WorkflowState::Success => Ok(Progress::Done),
        WorkflowState::Failed | WorkflowState::Timeout => Ok(Progress::Failed),
        WorkflowState::Unset | WorkflowState::Pending | WorkflowState::Running => Ok(Progress::Running),
        WorkflowState::Other(state) => Err(ProvisioningError::Workflow(format!(
            "Unknown workflow state {state}"
        ))),
    }
}

fn with_detail(status: ResourceStatus, detail: &str) -> ResourceStatus {
    if detail.is_empty() {
        status
    } else {
        status.with_details(detail)
    }
}

pub struct WorkflowOrchestrator {
    client: Arc<dyn WorkflowClient>,
    auth: Arc<dyn AuthService>,
    settings: TemplateSettings,
    enable_device_initialization: bool,
    disable_credentials_management: bool,
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("settings", &self.settings)
            .field("enable_device_initialization", &self.enable_device_initialization)
            .finish_non_exhaustive()
    }
}

impl WorkflowOrchestrator {
    pub fn new(
        client: Arc<dyn WorkflowClient>,
        auth: Arc<dyn AuthService>,
        settings: TemplateSettings,
        enable_device_initialization: bool,
        disable_credentials_management: bool,
    ) -> Self {
        Self {
            client,
            auth,
            settings,
            enable_device_initialization,
            disable_credentials_management,
        }
    }

    /// Device initialization workflow; reported on the host onboarding status
    pub async fn check_status_or_run_di(
        &self,
        device: &DeviceInfo,
        instance: &mut Instance,
    ) -> Result<(), ProvisioningError> {
        if !self.enable_device_initialization {
            return Ok(());
        }
        let name = names::di_workflow_name(&device.guid);
        let Some(workflow) = self.client.get_workflow(&name).await? else {
            set_onboarding(instance, &status::initialization_in_progress());
            let template = template_data::new_template(
                &names::di_template_name(&device.guid),
                template_data::di_template_data(device, &self.settings)?,
            );
            self.start(device, &name, template).await?;
            return Err(ProvisioningError::in_progress("DI workflow started"));
        };

        let detail = status_detail(&workflow);
        match progress(&workflow)? {
            Progress::Done => {
                set_onboarding(instance, &status::initialization_done());
                Ok(())
            }
            Progress::Failed => {
                set_onboarding(instance, &with_detail(status::initialization_failed(), &detail));
                Err(ProvisioningError::Aborted(format!("DI workflow {name} failed")))
            }
            Progress::Running => {
                set_onboarding(instance, &with_detail(status::initialization_in_progress(), &detail));
                Err(ProvisioningError::in_progress(format!("DI workflow {name} running")))
            }
        }
    }

    /// Reboot after device initialization; reported on the host onboarding status
    pub async fn check_status_or_run_reboot(
        &self,
        device: &DeviceInfo,
        instance: &mut Instance,
    ) -> Result<(), ProvisioningError> {
        if !self.enable_device_initialization {
            return Ok(());
        }
        let name = names::reboot_workflow_name(&device.guid);
        let Some(workflow) = self.client.get_workflow(&name).await? else {
            set_onboarding(instance, &status::reboot_in_progress());
            let template = template_data::new_template(
                &names::reboot_template_name(&device.guid),
                template_data::reboot_template_data(device, &self.settings)?,
            );
            self.start(device, &name, template).await?;
            return Err(ProvisioningError::in_progress("Reboot workflow started"));
        };

        match progress(&workflow)? {
            Progress::Done => {
                // Keep "Onboarded" set by the handshake
                if instance
                    .host
                    .as_ref()
                    .is_some_and(|h| h.onboarding_status == status::REBOOT_IN_PROGRESS)
                {
                    set_onboarding(instance, &status::reboot_done());
                }
                Ok(())
            }
            Progress::Failed => {
                set_onboarding(instance, &status::reboot_failed());
                Err(ProvisioningError::Aborted(format!("Reboot workflow {name} failed")))
            }
            Progress::Running => Err(ProvisioningError::in_progress(format!(
                "Reboot workflow {name} running"
            ))),
        }
    }

    /// OS installation; reported on the instance provisioning status
    pub async fn check_status_or_run_prod(
        &self,
        device: &DeviceInfo,
        instance: &mut Instance,
    ) -> Result<(), ProvisioningError> {
        let name = names::prod_workflow_name(&device.guid);
        if let Some(workflow) = self.client.get_workflow(&name).await? {
            status::set_provisioning_status(instance, &status::provisioning_in_progress());
            return self
                .handle_workflow_status(
                    instance,
                    &workflow,
                    status::provisioning_done(),
                    status::provisioning_failed(),
                )
                .await;
        }

        if self.enable_device_initialization {
            set_onboarding(instance, &status::onboarding_done());
        } else if !self.disable_credentials_management {
            // Without FDO the device receives its credentials from the prod workflow
            ensure_credentials(self.auth.as_ref(), &device.tenant_id, &device.guid).await?;
        }

        status::set_provisioning_status(instance, &status::provisioning_in_progress());
        let template = template_data::new_template(
            &names::prod_template_name(&device.img_type, &device.guid),
            template_data::prod_template_data(device, &self.settings)?,
        );
        self.start(device, &name, template).await?;
        Err(ProvisioningError::in_progress("Prod workflow started"))
    }

    /// Map the state of an existing workflow onto the instance
    ///
    /// SUCCESS sets the instance RUNNING with the OS recorded on the device
    /// hardware and the host "Rebooting", FAILED/TIMEOUT abort, unset/PENDING/RUNNING stay in progress
    /// with the current action as detail.
    pub async fn handle_workflow_status(
        &self,
        instance: &mut Instance,
        workflow: &Workflow,
        on_success: ResourceStatus,
        on_failure: ResourceStatus,
    ) -> Result<(), ProvisioningError> {
        let name = workflow.metadata.name.clone().unwrap_or_default();
        let detail = status_detail(workflow);
        debug!("Workflow {} is {} ({:?})", name, workflow.state(), detail);

        match progress(workflow)? {
            Progress::Done => {
                instance.current_state = InstanceState::Running;
                status::set_provisioning_status(instance, &with_detail(on_success, &detail));
                let os_resource_id = self.installed_os(instance).await?;
                instance.current_os = Some(OperatingSystem {
                    resource_id: os_resource_id,
                    tenant_id: instance.tenant_id.clone(),
                    ..OperatingSystem::default()
                });
                // Every successful workflow ends with a reboot into the new OS
                if let Some(host) = instance.host.as_deref_mut() {
                    status::set_host_status(host, &status::reboot_in_progress());
                }
                Ok(())
            }
            Progress::Failed => {
                instance.current_state = InstanceState::Error;
                status::set_provisioning_status(instance, &with_detail(on_failure, &detail));
                Err(ProvisioningError::Aborted(format!(
                    "Workflow {name} failed or timed out"
                )))
            }
            Progress::Running => {
                status::set_provisioning_status(
                    instance,
                    &with_detail(status::provisioning_in_progress(), &detail),
                );
                Err(ProvisioningError::in_progress(format!("Workflow {name} running")))
            }
        }
    }

    /// Delete every workflow, template and hardware object of the device
    pub async fn cleanup(&self, device: &DeviceInfo) -> Result<(), ProvisioningError> {
        info!("Deleting Tinkerbell resources of device {}", device.guid);
        self.client
            .delete_template(&names::prod_template_name(&device.img_type, &device.guid))
            .await?;
        self.client
            .delete_workflow(&names::prod_workflow_name(&device.guid))
            .await?;

        if self.enable_device_initialization {
            self.client
                .delete_template(&names::reboot_template_name(&device.guid))
                .await?;
            self.client
                .delete_workflow(&names::reboot_workflow_name(&device.guid))
                .await?;
            self.client
                .delete_template(&names::di_template_name(&device.guid))
                .await?;
            self.client
                .delete_workflow(&names::di_workflow_name(&device.guid))
                .await?;
        }

        self.client
            .delete_hardware(&names::hardware_name(&device.guid))
            .await
    }

    /// Create hardware, template and workflow for a step
    async fn start(
        &self,
        device: &DeviceInfo,
        workflow_name: &str,
        template: crds::Template,
    ) -> Result<(), ProvisioningError> {
        let template_name = template.metadata.name.clone().unwrap_or_default();
        info!("Starting workflow {} for device {}", workflow_name, device.guid);
        self.client
            .create_hardware_if_missing(&template_data::new_hardware(device))
            .await?;
        self.client.create_template_if_missing(&template).await?;
        self.client
            .create_workflow_if_missing(&template_data::new_workflow(workflow_name, &template_name, device))
            .await
    }

    /// OS resource ID recorded on the device hardware when its workflow was created
    async fn installed_os(&self, instance: &Instance) -> Result<String, ProvisioningError> {
        let guid = instance.host.as_deref().map(|h| h.uuid.as_str()).unwrap_or_default();
        let name = names::hardware_name(guid);
        let hardware = self
            .client
            .get_hardware(&name)
            .await?
            .ok_or_else(|| ProvisioningError::Workflow(format!("Tinkerbell hardware {name} not found")))?;

        let os_slug = hardware
            .spec
            .metadata
            .and_then(|m| m.instance)
            .and_then(|i| i.operating_system)
            .map(|os| os.os_slug)
            .filter(|slug| !slug.is_empty());
        os_slug.ok_or_else(|| {
            warn!("Hardware {} carries no OS resource ID", name);
            ProvisioningError::Workflow(format!("OS resource ID not found in Tinkerbell hardware {name}"))
        })
    }
}

fn set_onboarding(instance: &mut Instance, status: &ResourceStatus) {
    if let Some(host) = instance.host.as_deref_mut() {
        status::set_onboarding_status(host, status);
    }
}
