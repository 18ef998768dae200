//! Instance reconciliation
//!
//! An instance desired RUNNING is provisioned: device initialization, the FDO
//! ownership handshake, the post-DI reboot and finally the prod (OS install)
//! workflow. Each step either completes or reports "in progress", in which case
//! the engine retries and the next pass picks up where this one stopped.
//!
//! Status changes made along the way are written back once per pass, and only
//! the fields that actually changed.
//!
//! An instance whose host is (or is becoming) UNTRUSTED is never provisioned;
//! its leftover workflows are removed instead.

use super::settle;
use crate::classifier::{handle_inventory_error, handle_provisioning_error};
use crate::config::Config;
use crate::engine::{Directive, Reconcile, ReconcileId};
use crate::error::ProvisioningError;
use crate::handshake::OwnershipHandshake;
use crate::status;
use crate::workflow::{DeviceInfo, WorkflowOrchestrator};
use inventory_client::{
    FieldMask, Host, HostState, Instance, InstanceState, InventoryClientTrait, OsProviderKind, StatusIndicator, fields,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const CURRENT_OS: &str = "current_os";

/// Instance fields a provisioning pass may change
fn instance_mask() -> FieldMask {
    FieldMask::new([
        fields::CURRENT_STATE,
        fields::PROVISIONING_STATUS,
        fields::PROVISIONING_STATUS_INDICATOR,
        fields::PROVISIONING_STATUS_TIMESTAMP,
        CURRENT_OS,
    ])
}

/// Host statuses a provisioning pass may change, each written only when it moved
const HOST_STATUS_GROUPS: [[&str; 3]; 2] = [
    [
        fields::ONBOARDING_STATUS,
        fields::ONBOARDING_STATUS_INDICATOR,
        fields::ONBOARDING_STATUS_TIMESTAMP,
    ],
    [
        fields::HOST_STATUS,
        fields::HOST_STATUS_INDICATOR,
        fields::HOST_STATUS_TIMESTAMP,
    ],
];

fn changed_host_fields(old: &Host, new: &Host) -> Vec<&'static str> {
    HOST_STATUS_GROUPS
        .iter()
        .filter(|group| !FieldMask::new(**group).is_same_under_mask(old, new).unwrap_or(false))
        .flatten()
        .copied()
        .collect()
}

pub struct InstanceReconciler {
    inventory: Arc<dyn InventoryClientTrait>,
    orchestrator: Arc<WorkflowOrchestrator>,
    handshake: Arc<OwnershipHandshake>,
    config: Arc<Config>,
}

impl std::fmt::Debug for InstanceReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceReconciler")
            .field("orchestrator", &self.orchestrator)
            .field("handshake", &self.handshake)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Reconcile for InstanceReconciler {
    async fn reconcile(&self, id: &ReconcileId) -> Directive {
        debug!("Reconciling instance {} (tenant {})", id.resource_id, id.tenant_id);
        settle(self.reconcile_instance(id).await)
    }
}

impl InstanceReconciler {
    pub fn new(
        inventory: Arc<dyn InventoryClientTrait>,
        orchestrator: Arc<WorkflowOrchestrator>,
        handshake: Arc<OwnershipHandshake>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            inventory,
            orchestrator,
            handshake,
            config,
        }
    }

    async fn reconcile_instance(&self, id: &ReconcileId) -> Result<Directive, Directive> {
        let instance =
            handle_inventory_error(self.inventory.get_instance(&id.tenant_id, &id.resource_id).await)?;

        if instance.current_state == InstanceState::Error && instance.desired_state != InstanceState::Deleted {
            info!(
                "Instance {} is in ERROR, waiting for manual recovery",
                instance.resource_id
            );
            return Ok(Directive::Ack);
        }
        if let Some(provider) = instance.host.as_ref().and_then(|h| h.provider.as_ref()) {
            debug!(
                "Instance {} runs on a host managed by provider {}, skipping",
                instance.resource_id, provider.name
            );
            return Ok(Directive::Ack);
        }
        if instance.desired_state == InstanceState::Running && host_untrusted(&instance) {
            return Ok(self.settle_untrusted_host(instance).await);
        }
        if instance.current_state == instance.desired_state && !needs_provisioning_finish(&instance) {
            debug!("Instance {} already in state {:?}", instance.resource_id, instance.current_state);
            return Ok(Directive::Ack);
        }
        // With device initialization the FDO handshake onboards the host itself
        if instance.desired_state == InstanceState::Running
            && !self.config.enable_device_initialization
            && !host_onboarded(&instance)
        {
            info!(
                "Host of instance {} is not onboarded yet, skipping provisioning",
                instance.resource_id
            );
            return Ok(Directive::Ack);
        }

        match instance.desired_state {
            InstanceState::Running => Ok(self.provision(instance).await),
            InstanceState::Deleted => self.delete_instance(instance).await,
            InstanceState::Untrusted => self.invalidate_instance(instance).await,
            _ => Ok(Directive::Ack),
        }
    }

    async fn provision(&self, mut instance: Instance) -> Directive {
        let Some(os_provider) = instance.desired_os.as_ref().map(|os| os.os_provider) else {
            warn!("Instance {} has no desired OS, skipping provisioning", instance.resource_id);
            return Directive::Ack;
        };
        if os_provider != OsProviderKind::Infra {
            debug!(
                "Instance {} OS is provided by {:?}, skipping provisioning",
                instance.resource_id, os_provider
            );
            return Directive::Ack;
        }
        let device = match DeviceInfo::from_instance(&instance, &self.config) {
            Ok(device) => device,
            Err(e) => {
                error!("Cannot provision instance {}: {}", instance.resource_id, e);
                return Directive::Ack;
            }
        };

        let old = instance.clone();
        let result = self.run_provisioning(&device, &mut instance).await;
        if let Err(e) = &result
            && e.is_aborted()
        {
            error!("Provisioning of instance {} aborted: {}", instance.resource_id, e);
            instance.current_state = InstanceState::Error;
            if instance.provisioning_status_indicator != StatusIndicator::Error {
                status::set_provisioning_status(&mut instance, &status::provisioning_failed());
            }
        }
        self.write_back(&old, &instance).await;

        if let Some(directive) = handle_provisioning_error(result) {
            return directive;
        }

        info!("Instance {} provisioned", instance.resource_id);
        if let Err(e) = self.orchestrator.cleanup(&device).await {
            warn!(
                "Failed to clean up provisioning resources of instance {}: {}",
                instance.resource_id, e
            );
        }
        Directive::Ack
    }

    async fn run_provisioning(&self, device: &DeviceInfo, instance: &mut Instance) -> Result<(), ProvisioningError> {
        self.orchestrator.check_status_or_run_di(device, instance).await?;
        self.handshake
            .check_to2_status_or_run_fdo_actions(device, instance)
            .await?;
        self.orchestrator.check_status_or_run_reboot(device, instance).await?;
        self.orchestrator.check_status_or_run_prod(device, instance).await?;

        instance.current_state = InstanceState::Running;
        status::set_provisioning_status(instance, &status::provisioning_done());
        Ok(())
    }

    /// Persist the host onboarding status and instance fields changed by a pass
    ///
    /// Write failures are logged; the next pass recomputes the same statuses.
    async fn write_back(&self, old: &Instance, new: &Instance) {
        if let (Some(old_host), Some(new_host)) = (old.host.as_deref(), new.host.as_deref()) {
            let changed = changed_host_fields(old_host, new_host);
            if !changed.is_empty() {
                debug!("Updating {:?} of host {}", changed, new_host.resource_id);
                if let Err(e) = self.inventory.update_host(new_host, &FieldMask::new(changed)).await {
                    warn!("Failed to update host {}: {}", new_host.resource_id, e);
                }
            }
        }

        let mask = instance_mask();
        if !mask.is_same_under_mask(old, new).unwrap_or(false) {
            debug!("Updating instance {}", new.resource_id);
            if let Err(e) = self.inventory.update_instance(new, &mask).await {
                warn!("Failed to update instance {}: {}", new.resource_id, e);
            }
        }
    }

    /// The host lost its trust: stop provisioning and drop what it left behind
    ///
    /// Nothing is provisioned, so no credentials are issued again for the device.
    async fn settle_untrusted_host(&self, mut instance: Instance) -> Directive {
        if instance.provisioning_status == status::UNKNOWN {
            debug!("Instance {} already settled for its untrusted host", instance.resource_id);
            return Directive::Ack;
        }
        info!(
            "Host of instance {} is untrusted, removing provisioning resources",
            instance.resource_id
        );

        if let Ok(device) = DeviceInfo::from_instance(&instance, &self.config)
            && let Err(e) = self.orchestrator.cleanup(&device).await
        {
            // Whatever is left goes away with the instance
            warn!(
                "Failed to clean up provisioning resources of instance {}: {}",
                instance.resource_id, e
            );
            return Directive::Ack;
        }

        let old = instance.clone();
        status::set_provisioning_status(&mut instance, &status::unknown());
        if let Some(host) = instance.host.as_deref_mut() {
            status::set_onboarding_status(host, &status::unknown());
        }
        self.write_back(&old, &instance).await;
        Directive::Ack
    }

    async fn delete_instance(&self, mut instance: Instance) -> Result<Directive, Directive> {
        info!("Deleting instance {}", instance.resource_id);
        match DeviceInfo::from_instance(&instance, &self.config) {
            Ok(device) => {
                if let Some(directive) = handle_provisioning_error(self.orchestrator.cleanup(&device).await) {
                    return Err(directive);
                }
            }
            Err(e) => debug!(
                "Instance {} has no provisioning resources to clean up: {}",
                instance.resource_id, e
            ),
        }

        instance.current_state = InstanceState::Deleted;
        handle_inventory_error(
            self.inventory
                .update_instance(&instance, &FieldMask::new([fields::CURRENT_STATE]))
                .await,
        )?;
        Ok(Directive::Ack)
    }

    async fn invalidate_instance(&self, mut instance: Instance) -> Result<Directive, Directive> {
        info!("Invalidating instance {}", instance.resource_id);
        instance.current_state = InstanceState::Untrusted;
        handle_inventory_error(
            self.inventory
                .update_instance(&instance, &FieldMask::new([fields::CURRENT_STATE]))
                .await,
        )?;
        Ok(Directive::Ack)
    }
}

fn host_untrusted(instance: &Instance) -> bool {
    instance
        .host
        .as_deref()
        .is_some_and(|h| h.current_state == HostState::Untrusted || h.desired_state == HostState::Untrusted)
}

fn host_onboarded(instance: &Instance) -> bool {
    instance
        .host
        .as_deref()
        .is_some_and(|h| h.current_state == HostState::Onboarded)
}

/// RUNNING on both sides but the last pass stopped before "Provisioned"
fn needs_provisioning_finish(instance: &Instance) -> bool {
    instance.desired_state == InstanceState::Running && instance.provisioning_status != status::PROVISIONED
}
