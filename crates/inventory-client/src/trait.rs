//! InventoryClient trait for mocking
//!
//! This trait abstracts the inventory (ResourceStore) client so reconcilers can be
//! unit tested against an in-memory mock. Every call is tenant scoped except
//! `find_all`, which enumerates identities across tenants.

use crate::common::filter::Filter;
use crate::error::InventoryError;
use crate::field_mask::FieldMask;
use crate::models::*;
use tokio::sync::mpsc;

/// Trait for inventory client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait InventoryClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    async fn get(&self, tenant_id: &str, resource_id: &str) -> Result<Resource, InventoryError>;
    async fn list(
        &self,
        tenant_id: &str,
        kind: ResourceKind,
        filter: Option<&Filter>,
    ) -> Result<Vec<Resource>, InventoryError>;
    async fn create(&self, tenant_id: &str, resource: Resource) -> Result<Resource, InventoryError>;
    /// Write the fields named by `mask` from `resource`
    async fn update(
        &self,
        tenant_id: &str,
        resource_id: &str,
        mask: &FieldMask,
        resource: Resource,
    ) -> Result<Resource, InventoryError>;
    async fn delete(&self, tenant_id: &str, resource_id: &str) -> Result<(), InventoryError>;
    async fn find_all(&self, kind: ResourceKind) -> Result<Vec<TenantResourceId>, InventoryError>;

    /// Subscribe to change notifications for `kinds`.
    ///
    /// The returned channel holds at most `buffer` events; the producer waits for
    /// room instead of dropping events.
    async fn subscribe(
        &self,
        kinds: &[ResourceKind],
        buffer: usize,
    ) -> Result<mpsc::Receiver<InventoryEvent>, InventoryError>;

    // Typed helpers

    async fn get_host(&self, tenant_id: &str, resource_id: &str) -> Result<Host, InventoryError> {
        Host::try_from(self.get(tenant_id, resource_id).await?)
    }

    async fn get_instance(&self, tenant_id: &str, resource_id: &str) -> Result<Instance, InventoryError> {
        Instance::try_from(self.get(tenant_id, resource_id).await?)
    }

    async fn get_os(&self, tenant_id: &str, resource_id: &str) -> Result<OperatingSystem, InventoryError> {
        OperatingSystem::try_from(self.get(tenant_id, resource_id).await?)
    }

    async fn update_host(&self, host: &Host, mask: &FieldMask) -> Result<Host, InventoryError> {
        let updated = self
            .update(&host.tenant_id, &host.resource_id, mask, Resource::Host(host.clone()))
            .await?;
        Host::try_from(updated)
    }

    async fn update_instance(&self, instance: &Instance, mask: &FieldMask) -> Result<Instance, InventoryError> {
        let updated = self
            .update(
                &instance.tenant_id,
                &instance.resource_id,
                mask,
                Resource::Instance(instance.clone()),
            )
            .await?;
        Instance::try_from(updated)
    }

    async fn update_os(&self, os: &OperatingSystem, mask: &FieldMask) -> Result<OperatingSystem, InventoryError> {
        let updated = self
            .update(&os.tenant_id, &os.resource_id, mask, Resource::Os(os.clone()))
            .await?;
        OperatingSystem::try_from(updated)
    }

    /// IP addresses assigned to a host NIC
    async fn list_ip_addresses_by_nic(&self, tenant_id: &str, nic_id: &str) -> Result<Vec<IpAddress>, InventoryError> {
        let filter = Filter::by(fields::NIC_RESOURCE_ID, nic_id);
        self.list(tenant_id, ResourceKind::IpAddress, Some(&filter))
            .await?
            .into_iter()
            .map(IpAddress::try_from)
            .collect()
    }

    /// Instances scheduled on the host with the given UUID
    async fn list_instances_by_host_uuid(&self, tenant_id: &str, uuid: &str) -> Result<Vec<Instance>, InventoryError> {
        let filter = Filter::by(fields::HOST_UUID, uuid);
        self.list(tenant_id, ResourceKind::Instance, Some(&filter))
            .await?
            .into_iter()
            .map(Instance::try_from)
            .collect()
    }
}
