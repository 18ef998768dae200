//! OS resource reconciliation
//!
//! Fills in `repo_url` (`"<os_url>;<overlay_url>"`) for OS resources created
//! without one. Nothing here is worth retrying: a failed lookup is logged and
//! the periodic reconcile tries again.

use super::settle;
use crate::artifacts::ArtifactResolver;
use crate::engine::{Directive, Reconcile, ReconcileId};
use crate::workflow::REPO_URL_SEPARATOR;
use inventory_client::{FieldMask, InventoryClientTrait, fields};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct OsReconciler {
    inventory: Arc<dyn InventoryClientTrait>,
    artifacts: Arc<dyn ArtifactResolver>,
}

impl std::fmt::Debug for OsReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsReconciler").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Reconcile for OsReconciler {
    async fn reconcile(&self, id: &ReconcileId) -> Directive {
        debug!("Reconciling OS {} (tenant {})", id.resource_id, id.tenant_id);
        settle(self.reconcile_os(id).await)
    }
}

impl OsReconciler {
    pub fn new(inventory: Arc<dyn InventoryClientTrait>, artifacts: Arc<dyn ArtifactResolver>) -> Self {
        Self { inventory, artifacts }
    }

    async fn reconcile_os(&self, id: &ReconcileId) -> Result<Directive, Directive> {
        let os = self
            .inventory
            .get_os(&id.tenant_id, &id.resource_id)
            .await
            .map_err(|e| {
                warn!("Failed to get OS {}: {}", id.resource_id, e);
                Directive::Ack
            })?;
        if !os.repo_url.is_empty() {
            return Ok(Directive::Ack);
        }

        let artifacts = self
            .artifacts
            .resolve(&os.name, &os.architecture)
            .await
            .map_err(|e| {
                warn!("Failed to resolve artifacts of OS {}: {}", os.resource_id, e);
                Directive::Ack
            })?;

        let mut candidate = os.clone();
        candidate.repo_url = format!(
            "{}{}{}",
            artifacts.os_url, REPO_URL_SEPARATOR, artifacts.overlay_script_url
        );
        let mask = FieldMask::new([fields::REPO_URL]);
        if mask.is_same_under_mask(&os, &candidate).unwrap_or(false) {
            return Ok(Directive::Ack);
        }

        match self.inventory.update_os(&candidate, &mask).await {
            Ok(_) => info!("Set repo URL of OS {} to {}", os.resource_id, candidate.repo_url),
            Err(e) => warn!("Failed to update OS {}: {}", os.resource_id, e),
        }
        Ok(Directive::Ack)
    }
}
