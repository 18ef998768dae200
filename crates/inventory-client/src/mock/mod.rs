//! Mock InventoryClient for unit testing
//!
//! Keeps resources in memory, records every call and can be told to fail the next
//! call for a given resource.

use crate::common::filter::Filter;
use crate::error::InventoryError;
use crate::field_mask::FieldMask;
use crate::inventory_trait::InventoryClientTrait;
use crate::models::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Operation a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Get { resource_id: String },
    List { kind: ResourceKind, filter: Option<String> },
    Create { kind: ResourceKind, resource_id: String },
    Update { resource_id: String, paths: Vec<String> },
    Delete { resource_id: String },
    FindAll { kind: ResourceKind },
}

/// Mock InventoryClient for testing
#[derive(Clone, Default)]
pub struct MockInventoryClient {
    pub(crate) resources: Arc<Mutex<HashMap<String, Resource>>>,
    pub(crate) calls: Arc<Mutex<Vec<MockCall>>>,
    // Keyed by operation and resource ID (or kind name for list/create)
    pub(crate) failures: Arc<Mutex<HashMap<(MockOp, String), VecDeque<InventoryError>>>>,
    pub(crate) subscribers: Arc<Mutex<Vec<mpsc::Sender<InventoryEvent>>>>,
    // Counter for generating IDs
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockInventoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockInventoryClient").finish_non_exhaustive()
    }
}

impl MockInventoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add any resource to the mock store (for test setup)
    pub fn add_resource(&self, resource: impl Into<Resource>) {
        let resource = resource.into();
        self.resources
            .lock()
            .unwrap()
            .insert(resource.resource_id().to_string(), resource);
    }

    pub fn add_host(&self, host: Host) {
        self.add_resource(host);
    }

    pub fn add_instance(&self, instance: Instance) {
        self.add_resource(instance);
    }

    pub fn add_os(&self, os: OperatingSystem) {
        self.add_resource(os);
    }

    pub fn add_ip_address(&self, ip: IpAddress) {
        self.add_resource(ip);
    }

    /// Current stored copy of a resource
    pub fn stored(&self, resource_id: &str) -> Option<Resource> {
        self.resources.lock().unwrap().get(resource_id).cloned()
    }

    pub fn stored_host(&self, resource_id: &str) -> Option<Host> {
        self.stored(resource_id).and_then(|r| Host::try_from(r).ok())
    }

    pub fn stored_instance(&self, resource_id: &str) -> Option<Instance> {
        self.stored(resource_id).and_then(|r| Instance::try_from(r).ok())
    }

    pub fn stored_os(&self, resource_id: &str) -> Option<OperatingSystem> {
        self.stored(resource_id).and_then(|r| OperatingSystem::try_from(r).ok())
    }

    /// Make the next `op` on `key` fail with `error`.
    ///
    /// `key` is the resource ID for get/update/delete and the kind name for
    /// list/create.
    pub fn fail_next(&self, op: MockOp, key: impl Into<String>, error: InventoryError) {
        self.failures
            .lock()
            .unwrap()
            .entry((op, key.into()))
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Resource IDs passed to `delete`, in call order
    pub fn deleted_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Delete { resource_id } => Some(resource_id),
                _ => None,
            })
            .collect()
    }

    /// Field masks of every `update` on `resource_id`, in call order
    pub fn updates_for(&self, resource_id: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Update { resource_id: id, paths } if id == resource_id => Some(paths),
                _ => None,
            })
            .collect()
    }

    /// Number of calls that write (create, update, delete)
    pub fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Create { .. } | MockCall::Update { .. } | MockCall::Delete { .. }))
            .count()
    }

    /// Deliver an event to every subscriber, waiting for channel capacity
    pub async fn emit(&self, event: InventoryEvent) {
        let subscribers = self.subscribers.lock().unwrap().clone();
        for tx in subscribers {
            let _ = tx.send(event.clone()).await;
        }
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(&self, op: MockOp, key: &str) -> Option<InventoryError> {
        self.failures
            .lock()
            .unwrap()
            .get_mut(&(op, key.to_string()))
            .and_then(VecDeque::pop_front)
    }

    fn lookup(&self, tenant_id: &str, resource_id: &str) -> Result<Resource, InventoryError> {
        self.resources
            .lock()
            .unwrap()
            .get(resource_id)
            .filter(|r| r.tenant_id() == tenant_id)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound(format!("Resource not found: {}", resource_id)))
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }
}

#[async_trait::async_trait]
impl InventoryClientTrait for MockInventoryClient {
    fn base_url(&self) -> &str {
        "mock://inventory"
    }

    async fn get(&self, tenant_id: &str, resource_id: &str) -> Result<Resource, InventoryError> {
        self.record(MockCall::Get {
            resource_id: resource_id.to_string(),
        });
        if let Some(err) = self.take_failure(MockOp::Get, resource_id) {
            return Err(err);
        }
        self.lookup(tenant_id, resource_id)
    }

    async fn list(
        &self,
        tenant_id: &str,
        kind: ResourceKind,
        filter: Option<&Filter>,
    ) -> Result<Vec<Resource>, InventoryError> {
        self.record(MockCall::List {
            kind,
            filter: filter.map(ToString::to_string),
        });
        if let Some(err) = self.take_failure(MockOp::List, kind.as_str()) {
            return Err(err);
        }
        let resources = self.resources.lock().unwrap();
        let mut matched = Vec::new();
        for resource in resources.values() {
            if resource.kind() != kind || resource.tenant_id() != tenant_id {
                continue;
            }
            let value = resource.to_value()?;
            if filter.is_none_or(|f| f.matches(&value)) {
                matched.push(resource.clone());
            }
        }
        matched.sort_by(|a, b| a.resource_id().cmp(b.resource_id()));
        Ok(matched)
    }

    async fn create(&self, tenant_id: &str, mut resource: Resource) -> Result<Resource, InventoryError> {
        let kind = resource.kind();
        if let Some(err) = self.take_failure(MockOp::Create, kind.as_str()) {
            self.record(MockCall::Create {
                kind,
                resource_id: resource.resource_id().to_string(),
            });
            return Err(err);
        }
        let resource_id = if resource.resource_id().is_empty() {
            format!("{}-{:08x}", kind.prefix(), self.next_id())
        } else {
            resource.resource_id().to_string()
        };
        self.record(MockCall::Create {
            kind,
            resource_id: resource_id.clone(),
        });
        let mut resources = self.resources.lock().unwrap();
        if resources.contains_key(&resource_id) {
            return Err(InventoryError::AlreadyExists(resource_id));
        }
        resource.set_ids(&resource_id, tenant_id);
        resources.insert(resource_id, resource.clone());
        Ok(resource)
    }

    async fn update(
        &self,
        tenant_id: &str,
        resource_id: &str,
        mask: &FieldMask,
        resource: Resource,
    ) -> Result<Resource, InventoryError> {
        self.record(MockCall::Update {
            resource_id: resource_id.to_string(),
            paths: mask.paths().to_vec(),
        });
        if let Some(err) = self.take_failure(MockOp::Update, resource_id) {
            return Err(err);
        }
        mask.validate()?;
        let stored = self.lookup(tenant_id, resource_id)?;
        if stored.kind() != resource.kind() {
            return Err(InventoryError::UnexpectedKind {
                expected: stored.kind().as_str(),
                actual: resource.kind().as_str(),
            });
        }
        let mut value = stored.to_value()?;
        mask.merge(&mut value, &resource.to_value()?);
        let updated = Resource::from_value(stored.kind(), value)?;
        self.resources
            .lock()
            .unwrap()
            .insert(resource_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, tenant_id: &str, resource_id: &str) -> Result<(), InventoryError> {
        self.record(MockCall::Delete {
            resource_id: resource_id.to_string(),
        });
        if let Some(err) = self.take_failure(MockOp::Delete, resource_id) {
            return Err(err);
        }
        self.lookup(tenant_id, resource_id)?;
        self.resources.lock().unwrap().remove(resource_id);
        Ok(())
    }

    async fn find_all(&self, kind: ResourceKind) -> Result<Vec<TenantResourceId>, InventoryError> {
        self.record(MockCall::FindAll { kind });
        let mut ids: Vec<TenantResourceId> = self
            .resources
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.kind() == kind)
            .map(|r| TenantResourceId {
                tenant_id: r.tenant_id().to_string(),
                resource_id: r.resource_id().to_string(),
            })
            .collect();
        ids.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        Ok(ids)
    }

    async fn subscribe(
        &self,
        _kinds: &[ResourceKind],
        buffer: usize,
    ) -> Result<mpsc::Receiver<InventoryEvent>, InventoryError> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.subscribers.lock().unwrap().push(tx);
        Ok(rx)
    }
}
