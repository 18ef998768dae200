//! Host reconciliation
//!
//! Hosts are onboarded by the instance flow; this reconciler only handles the
//! way out: deletion (with a cascade over the host sub-resources) and
//! invalidation. Both revoke the device credentials.

use super::settle;
use crate::classifier::handle_inventory_error;
use crate::engine::{Directive, Reconcile, ReconcileId};
use crate::status;
use auth_service::AuthService;
use inventory_client::{FieldMask, Host, HostState, InventoryClientTrait, ResourceStatus, fields};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct HostReconciler {
    inventory: Arc<dyn InventoryClientTrait>,
    auth: Arc<dyn AuthService>,
    disable_credentials_management: bool,
}

impl std::fmt::Debug for HostReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostReconciler")
            .field("disable_credentials_management", &self.disable_credentials_management)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Reconcile for HostReconciler {
    async fn reconcile(&self, id: &ReconcileId) -> Directive {
        debug!("Reconciling host {} (tenant {})", id.resource_id, id.tenant_id);
        settle(self.reconcile_host(id).await)
    }
}

impl HostReconciler {
    pub fn new(
        inventory: Arc<dyn InventoryClientTrait>,
        auth: Arc<dyn AuthService>,
        disable_credentials_management: bool,
    ) -> Self {
        Self {
            inventory,
            auth,
            disable_credentials_management,
        }
    }

    async fn reconcile_host(&self, id: &ReconcileId) -> Result<Directive, Directive> {
        let mut host = handle_inventory_error(self.inventory.get_host(&id.tenant_id, &id.resource_id).await)?;

        if let Some(provider) = &host.provider {
            debug!("Host {} is managed by provider {}, skipping", host.resource_id, provider.name);
            return Ok(Directive::Ack);
        }
        if host.desired_state == host.current_state {
            debug!("Host {} already in state {:?}", host.resource_id, host.current_state);
            return Ok(Directive::Ack);
        }

        match host.desired_state {
            HostState::Deleted => self.delete_host(&mut host).await,
            HostState::Untrusted => self.invalidate_host(&mut host).await,
            _ => Ok(Directive::Ack),
        }
    }

    async fn delete_host(&self, host: &mut Host) -> Result<Directive, Directive> {
        if let Some(instance) = host.instance.as_ref().filter(|i| !i.resource_id.is_empty()) {
            let detail = format!("waiting on {} deletion", instance.resource_id);
            info!("Host {} deletion blocked: {}", host.resource_id, detail);
            let instance_id = instance.resource_id.clone();
            self.write_status_detail(host, &status::deleting().with_details(&detail)).await;
            return Ok(Directive::retry(anyhow::anyhow!(
                "host {} still has instance {}",
                host.resource_id,
                instance_id
            )));
        }

        info!("Deleting host {}", host.resource_id);
        self.write_status_detail(host, &status::deleting()).await;

        if host.current_state != HostState::Untrusted {
            self.revoke_credentials(host).await?;
        }

        let tenant_id = host.tenant_id.clone();
        for nic in &host.host_nics {
            let addresses = handle_inventory_error(
                self.inventory
                    .list_ip_addresses_by_nic(&tenant_id, &nic.resource_id)
                    .await,
            )?;
            for address in &addresses {
                self.delete_sub_resource(&tenant_id, &address.resource_id).await?;
            }
            self.delete_sub_resource(&tenant_id, &nic.resource_id).await?;
        }

        let devices = host
            .host_storages
            .iter()
            .map(|s| &s.resource_id)
            .chain(host.host_usbs.iter().map(|u| &u.resource_id))
            .chain(host.host_gpus.iter().map(|g| &g.resource_id));
        for resource_id in devices {
            self.delete_sub_resource(&tenant_id, resource_id).await?;
        }

        host.current_state = HostState::Deleted;
        handle_inventory_error(
            self.inventory
                .update_host(host, &FieldMask::new([fields::CURRENT_STATE]))
                .await,
        )?;
        info!("Host {} deleted", host.resource_id);
        Ok(Directive::Ack)
    }

    async fn invalidate_host(&self, host: &mut Host) -> Result<Directive, Directive> {
        info!("Invalidating host {}", host.resource_id);
        self.revoke_credentials(host).await?;

        host.current_state = HostState::Untrusted;
        status::set_host_status(host, &status::invalidated());
        let mask = FieldMask::new([
            fields::CURRENT_STATE,
            fields::HOST_STATUS,
            fields::HOST_STATUS_INDICATOR,
            fields::HOST_STATUS_TIMESTAMP,
        ]);
        handle_inventory_error(self.inventory.update_host(host, &mask).await)?;
        Ok(Directive::Ack)
    }

    async fn revoke_credentials(&self, host: &Host) -> Result<(), Directive> {
        if self.disable_credentials_management {
            return Ok(());
        }
        match self.auth.revoke_credentials(&host.tenant_id, &host.uuid).await {
            Ok(()) => {
                info!("Revoked credentials of host {}", host.resource_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Host {} has no credentials to revoke", host.resource_id);
                Ok(())
            }
            Err(e) => Err(Directive::retry(e)),
        }
    }

    /// Delete a host sub-resource; already gone counts as deleted
    async fn delete_sub_resource(&self, tenant_id: &str, resource_id: &str) -> Result<(), Directive> {
        match self.inventory.delete(tenant_id, resource_id).await {
            Ok(()) => {
                debug!("Deleted {}", resource_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => handle_inventory_error(Err(e)),
        }
    }

    /// Best effort; a failed write does not stop the reconciliation
    ///
    /// Only the detail moves, so an "Invalidated" host status survives deletion.
    async fn write_status_detail(&self, host: &mut Host, status: &ResourceStatus) {
        host.host_status_detail = status.status.clone();
        let mask = FieldMask::new([fields::HOST_STATUS_DETAIL]);
        if let Err(e) = self.inventory.update_host(host, &mask).await {
            warn!("Failed to update status detail of host {}: {}", host.resource_id, e);
        }
    }
}
