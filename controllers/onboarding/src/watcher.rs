//! Tinkerbell workflow watcher
//!
//! Workflow state changes happen outside the inventory, so no inventory event
//! announces them. This watcher follows `Workflow` objects and re-enqueues the
//! instance of the device each changed workflow belongs to.

use crate::engine::{EngineHandle, ReconcileId};
use crate::error::ControllerError;
use crate::workflow::names;
use crds::Workflow;
use futures::StreamExt;
use inventory_client::{InventoryClientTrait, InventoryError, ResourceKind};
use kube::{Api, Client};
use kube_runtime::{WatchStreamExt, watcher};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct WorkflowWatcher {
    api: Api<Workflow>,
    inventory: Arc<dyn InventoryClientTrait>,
    engine: EngineHandle,
}

impl WorkflowWatcher {
    pub fn new(
        client: Client,
        namespace: &str,
        inventory: Arc<dyn InventoryClientTrait>,
        engine: EngineHandle,
    ) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            inventory,
            engine,
        }
    }

    /// Follow workflow changes until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ControllerError> {
        info!("Starting Workflow watcher");
        let stream = watcher(self.api.clone(), watcher::Config::default())
            .default_backoff()
            .applied_objects();
        let mut stream = std::pin::pin!(stream);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(workflow)) => self.on_workflow(&workflow).await,
                    Some(Err(e)) => warn!("Workflow watch error: {}", e),
                    None => {
                        return Err(ControllerError::Watch("Workflow watch stream ended".to_string()));
                    }
                },
            }
        }
        info!("Workflow watcher stopped");
        Ok(())
    }

    async fn on_workflow(&self, workflow: &Workflow) {
        let name = workflow.metadata.name.as_deref().unwrap_or_default();
        let Some(guid) = names::device_guid(name) else {
            debug!("Ignoring workflow {}", name);
            return;
        };
        debug!("Workflow {} changed ({})", name, workflow.state());

        match instances_of_device(self.inventory.as_ref(), guid).await {
            Ok(ids) => {
                for id in ids {
                    if !self.engine.enqueue(id).await {
                        return;
                    }
                }
            }
            Err(e) => warn!("Failed to find instance of device {}: {}", guid, e),
        }
    }
}

/// Instances scheduled on the host with UUID `guid`, across tenants
pub async fn instances_of_device(
    inventory: &dyn InventoryClientTrait,
    guid: &str,
) -> Result<Vec<ReconcileId>, InventoryError> {
    let tenants: BTreeSet<String> = inventory
        .find_all(ResourceKind::Host)
        .await?
        .into_iter()
        .map(|id| id.tenant_id)
        .collect();

    let mut ids = Vec::new();
    for tenant_id in tenants {
        for instance in inventory.list_instances_by_host_uuid(&tenant_id, guid).await? {
            ids.push(ReconcileId {
                tenant_id: instance.tenant_id,
                resource_id: instance.resource_id,
            });
        }
    }
    Ok(ids)
}
