//! Main controller implementation.
//!
//! Builds every client from the [`Config`], registers the host, instance and
//! OS reconcilers with the [`ReconcileEngine`] and feeds it from three
//! sources:
//! - inventory change events
//! - a periodic reconcile-all over instances and OS resources
//! - the Tinkerbell workflow watcher
//!
//! Ctrl-C cancels everything; the engine finishes the reconciliations already
//! running before [`Controller::run`] returns.

use crate::artifacts::{CachedResolver, HttpArtifactResolver};
use crate::config::Config;
use crate::engine::{EngineHandle, ReconcileEngine, ReconcileId};
use crate::error::ControllerError;
use crate::handshake::OwnershipHandshake;
use crate::reconciler::{HostReconciler, InstanceReconciler, OsReconciler};
use crate::watcher::WorkflowWatcher;
use crate::workflow::template_data::TemplateSettings;
use crate::workflow::{KubeWorkflowClient, WorkflowOrchestrator};
use auth_service::{AuthService, KeycloakAuthService};
use fdo_client::FdoClient;
use inventory_client::{EventKind, InventoryClient, InventoryClientTrait, InventoryError, InventoryEvent, ResourceKind};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Kinds the manager subscribes to and reconciles
const WATCHED_KINDS: [ResourceKind; 3] = [ResourceKind::Host, ResourceKind::Instance, ResourceKind::Os];

/// Kinds re-enqueued by the periodic reconcile-all
const PERIODIC_KINDS: [ResourceKind; 2] = [ResourceKind::Instance, ResourceKind::Os];

/// Main controller of the onboarding manager.
pub struct Controller {
    config: Arc<Config>,
    inventory: Arc<dyn InventoryClientTrait>,
    auth: Arc<dyn AuthService>,
    engine: ReconcileEngine,
    watcher: WorkflowWatcher,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing onboarding manager");
        let config = Arc::new(config);

        let kube_client = Client::try_default().await?;

        let inventory: Arc<dyn InventoryClientTrait> = Arc::new(InventoryClient::new(
            config.inventory_url.clone(),
            None,
            config.inventory_timeout,
        )?);

        // The admin session opens on first use, so an unreachable Keycloak
        // does not block startup
        let auth: Arc<dyn AuthService> = Arc::new(KeycloakAuthService::new(
            config.keycloak_url.clone(),
            config.keycloak_client_secret.clone(),
        )?);

        let fdo = Arc::new(FdoClient::new(
            config.fdo_owner_url.clone(),
            config.fdo_mfg_url.clone(),
            config.fdo_rv_enabled,
        )?);

        let artifacts = Arc::new(CachedResolver::new(
            Arc::new(HttpArtifactResolver::new(
                config.artifact_service_url.clone(),
                Duration::from_secs(30),
            )?),
            config.artifact_cache_ttl,
        ));

        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            Arc::new(KubeWorkflowClient::new(kube_client.clone(), &config.namespace)),
            Arc::clone(&auth),
            TemplateSettings::from_config(&config),
            config.enable_device_initialization,
            config.disable_credentials_management,
        ));
        let handshake = Arc::new(OwnershipHandshake::new(
            fdo,
            Arc::clone(&auth),
            config.enable_device_initialization,
        ));

        let mut engine = ReconcileEngine::new(config.reconcile_parallelism, config.event_buffer);
        engine.register(
            ResourceKind::Host,
            Arc::new(HostReconciler::new(
                Arc::clone(&inventory),
                Arc::clone(&auth),
                config.disable_credentials_management,
            )),
        );
        engine.register(
            ResourceKind::Instance,
            Arc::new(InstanceReconciler::new(
                Arc::clone(&inventory),
                orchestrator,
                handshake,
                Arc::clone(&config),
            )),
        );
        engine.register(
            ResourceKind::Os,
            Arc::new(OsReconciler::new(Arc::clone(&inventory), artifacts)),
        );

        let watcher = WorkflowWatcher::new(
            kube_client,
            &config.namespace,
            Arc::clone(&inventory),
            engine.handle(),
        );

        Ok(Self {
            config,
            inventory,
            auth,
            engine,
            watcher,
        })
    }

    /// Runs the controller until Ctrl-C or until an event source fails.
    pub async fn run(self) -> Result<(), ControllerError> {
        let Self {
            config,
            inventory,
            auth,
            engine,
            watcher,
        } = self;
        let cancel = CancellationToken::new();
        let handle = engine.handle();

        let events = inventory.subscribe(&WATCHED_KINDS, config.event_buffer).await?;
        info!("Subscribed to inventory events for {:?}", WATCHED_KINDS);

        let engine_task = tokio::spawn(engine.run(cancel.clone()));

        let mut sources = JoinSet::new();
        sources.spawn(forward_events(events, handle.clone(), cancel.clone()));
        sources.spawn(reconcile_periodically(
            Arc::clone(&inventory),
            handle,
            config.reconcile_period,
            cancel.clone(),
        ));
        sources.spawn(watcher.run(cancel.clone()));

        let mut outcome = Ok(());
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            },
            Some(joined) = sources.join_next() => {
                outcome = match joined {
                    Ok(result) => result,
                    Err(e) => Err(ControllerError::Watch(format!("event source panicked: {e}"))),
                };
                if let Err(e) = &outcome {
                    error!("Event source stopped: {}", e);
                }
            }
        }

        cancel.cancel();
        while let Some(joined) = sources.join_next().await {
            if let Ok(Err(e)) = joined {
                warn!("Event source stopped with error during shutdown: {}", e);
            }
        }
        if let Err(e) = engine_task.await {
            error!("Reconcile engine task failed: {}", e);
        }
        auth.logout().await;
        info!("Onboarding manager stopped");
        outcome
    }
}

/// Engine identity for an inventory event, `None` when nothing should run
///
/// Deleted hosts are gone from the inventory, there is nothing left to reconcile.
fn route_event(event: &InventoryEvent) -> Option<ReconcileId> {
    match (event.resource_kind()?, event.kind) {
        (ResourceKind::Host, EventKind::Deleted) => None,
        (ResourceKind::Host | ResourceKind::Instance | ResourceKind::Os, _) => Some(ReconcileId {
            tenant_id: event.tenant_id.clone(),
            resource_id: event.resource_id.clone(),
        }),
        _ => None,
    }
}

async fn forward_events(
    mut events: mpsc::Receiver<InventoryEvent>,
    engine: EngineHandle,
    cancel: CancellationToken,
) -> Result<(), ControllerError> {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            event = events.recv() => event,
        };
        let Some(event) = event else {
            return Err(ControllerError::Watch("inventory event stream closed".to_string()));
        };
        match route_event(&event) {
            Some(id) => {
                debug!("Inventory event {:?} for {}", event.kind, event.resource_id);
                if !engine.enqueue(id).await {
                    return Ok(());
                }
            }
            None => debug!("Dropping inventory event {:?} for {}", event.kind, event.resource_id),
        }
    }
}

/// Every instance and OS identity known to the inventory
async fn all_identities(inventory: &dyn InventoryClientTrait) -> Result<Vec<ReconcileId>, InventoryError> {
    let mut ids = Vec::new();
    for kind in PERIODIC_KINDS {
        ids.extend(inventory.find_all(kind).await?);
    }
    Ok(ids)
}

async fn reconcile_periodically(
    inventory: Arc<dyn InventoryClientTrait>,
    engine: EngineHandle,
    period: Duration,
    cancel: CancellationToken,
) -> Result<(), ControllerError> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
        match all_identities(inventory.as_ref()).await {
            Ok(ids) => {
                debug!("Periodic reconcile of {} resources", ids.len());
                for id in ids {
                    if !engine.enqueue(id).await {
                        return Ok(());
                    }
                }
            }
            Err(e) => warn!("Periodic reconcile could not list resources: {}", e),
        }
    }
}
