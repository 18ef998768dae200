//! Reconcile engine
//!
//! A kind-agnostic control loop. Change notifications for `(tenant, resource)`
//! identities arrive on a bounded channel, are routed to the reconciler
//! registered for the resource kind, and the returned [`Directive`] decides
//! whether the identity is done, retried after a backoff, or given up on.
//!
//! Guarantees:
//! - at most one reconciliation per identity is in flight; events arriving
//!   meanwhile collapse into a single rerun
//! - at most `parallelism` reconciliations run at once across identities
//! - retries back off exponentially per identity and reset on success
//! - cancellation stops new work, drops pending retries and waits for the
//!   reconciliations already running

use crate::backoff::{ExponentialBackoff, MAX_DELAY, MIN_DELAY};
use futures::FutureExt;
use inventory_client::{ResourceKind, TenantResourceId};
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Identity a reconciliation runs for
pub type ReconcileId = TenantResourceId;

/// Retry delay bounds attached to a retry directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub min: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min: MIN_DELAY,
            max: MAX_DELAY,
        }
    }
}

/// What the engine should do with an identity after a reconciliation
#[derive(Debug)]
pub enum Directive {
    /// Done until the next change notification
    Ack,
    /// Run again after a backoff delay
    Retry {
        error: anyhow::Error,
        backoff: BackoffPolicy,
    },
    /// Give up; no automatic retries
    Fail(anyhow::Error),
}

impl Directive {
    /// Retry with the default 1s..30s exponential backoff
    pub fn retry(error: impl Into<anyhow::Error>) -> Self {
        Self::Retry {
            error: error.into(),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn fail(error: impl Into<anyhow::Error>) -> Self {
        Self::Fail(error.into())
    }

    #[must_use]
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }

    #[must_use]
    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }
}

/// A per-kind reconcile function
#[async_trait::async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self, id: &ReconcileId) -> Directive;
}

/// Cloneable sender side of the engine's event channel
///
/// `enqueue` waits while the channel is full; events are never dropped.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<ReconcileId>,
}

impl EngineHandle {
    /// Ask for a reconciliation of `id`; returns `false` once the engine stopped
    pub async fn enqueue(&self, id: ReconcileId) -> bool {
        self.tx.send(id).await.is_ok()
    }
}

/// Scheduling state of one identity
#[derive(Debug, Default)]
struct Slot {
    in_flight: bool,
    queued: bool,
    /// An event arrived while in flight
    pending: bool,
    backoff: Option<ExponentialBackoff>,
}

impl Slot {
    fn is_idle(&self) -> bool {
        !self.in_flight && !self.queued && !self.pending && self.backoff.is_none()
    }
}

pub struct ReconcileEngine {
    reconcilers: HashMap<ResourceKind, Arc<dyn Reconcile>>,
    parallelism: usize,
    tx: mpsc::Sender<ReconcileId>,
    rx: mpsc::Receiver<ReconcileId>,
}

impl std::fmt::Debug for ReconcileEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileEngine")
            .field("kinds", &self.reconcilers.keys().collect::<Vec<_>>())
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

impl ReconcileEngine {
    /// `parallelism` bounds concurrent reconciliations, `buffer` the event channel
    #[must_use]
    pub fn new(parallelism: usize, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        Self {
            reconcilers: HashMap::new(),
            parallelism: parallelism.max(1),
            tx,
            rx,
        }
    }

    /// Route identities of `kind` to `reconciler`
    pub fn register(&mut self, kind: ResourceKind, reconciler: Arc<dyn Reconcile>) {
        self.reconcilers.insert(kind, reconciler);
    }

    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        EngineHandle { tx: self.tx.clone() }
    }

    /// Run until `cancel` fires, or until every handle is dropped and all work
    /// has drained.
    pub async fn run(self, cancel: CancellationToken) {
        let Self {
            reconcilers,
            parallelism,
            tx,
            rx,
        } = self;
        // Only external handles keep the channel open
        drop(tx);

        let mut scheduler = Scheduler {
            reconcilers,
            parallelism,
            slots: HashMap::new(),
            ready: VecDeque::new(),
            running: JoinSet::new(),
            timers: JoinSet::new(),
        };
        scheduler.run(rx, &cancel).await;
    }
}

struct Scheduler {
    reconcilers: HashMap<ResourceKind, Arc<dyn Reconcile>>,
    parallelism: usize,
    slots: HashMap<ReconcileId, Slot>,
    ready: VecDeque<ReconcileId>,
    running: JoinSet<(ReconcileId, Directive)>,
    /// Pending retries; each task sleeps and then yields its identity
    timers: JoinSet<ReconcileId>,
}

impl Scheduler {
    async fn run(&mut self, mut rx: mpsc::Receiver<ReconcileId>, cancel: &CancellationToken) {
        info!("Reconcile engine started (parallelism {})", self.parallelism);
        let mut inputs_closed = false;

        loop {
            self.start_ready();

            if inputs_closed && self.running.is_empty() && self.timers.is_empty() && self.ready.is_empty() {
                debug!("Event channel closed and no work left");
                break;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(joined) = self.running.join_next(), if !self.running.is_empty() => {
                    match joined {
                        Ok((id, directive)) => self.complete(id, directive),
                        Err(e) => error!("Reconcile task failed to join: {}", e),
                    }
                }
                Some(Ok(id)) = self.timers.join_next(), if !self.timers.is_empty() => {
                    debug!("Retrying {}", id.resource_id);
                    self.enqueue(id);
                }
                event = rx.recv(), if !inputs_closed => match event {
                    Some(id) => self.enqueue(id),
                    None => inputs_closed = true,
                },
            }
        }

        self.shutdown().await;
    }

    fn enqueue(&mut self, id: ReconcileId) {
        let slot = self.slots.entry(id.clone()).or_default();
        if slot.in_flight {
            slot.pending = true;
        } else if !slot.queued {
            slot.queued = true;
            self.ready.push_back(id);
        }
    }

    fn start_ready(&mut self) {
        while self.running.len() < self.parallelism {
            let Some(id) = self.ready.pop_front() else {
                return;
            };
            let Some(reconciler) = ResourceKind::from_resource_id(&id.resource_id)
                .and_then(|kind| self.reconcilers.get(&kind))
                .cloned()
            else {
                warn!("No reconciler registered for {}, dropping event", id.resource_id);
                self.slots.remove(&id);
                continue;
            };

            if let Some(slot) = self.slots.get_mut(&id) {
                slot.queued = false;
                slot.in_flight = true;
            }
            self.running.spawn(async move {
                let directive = AssertUnwindSafe(reconciler.reconcile(&id))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Directive::fail(anyhow::anyhow!("reconciler panicked")));
                (id, directive)
            });
        }
    }

    fn complete(&mut self, id: ReconcileId, directive: Directive) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        slot.in_flight = false;

        match directive {
            Directive::Ack => {
                debug!("Reconciliation of {} acknowledged", id.resource_id);
                slot.backoff = None;
            }
            Directive::Retry { error, backoff } => {
                let delay = slot
                    .backoff
                    .get_or_insert_with(|| ExponentialBackoff::new(backoff.min, backoff.max))
                    .next_backoff();
                warn!(
                    "Reconciliation of {} will be retried in {:?}: {:#}",
                    id.resource_id, delay, error
                );
                if !slot.pending {
                    let retry_id = id.clone();
                    self.timers.spawn(async move {
                        tokio::time::sleep(delay).await;
                        retry_id
                    });
                }
            }
            Directive::Fail(error) => {
                error!("Reconciliation of {} failed permanently: {:#}", id.resource_id, error);
                slot.backoff = None;
            }
        }

        if slot.pending {
            slot.pending = false;
            self.enqueue(id);
        } else if slot.is_idle() {
            self.slots.remove(&id);
        }
    }

    async fn shutdown(&mut self) {
        info!(
            "Reconcile engine stopping: dropping {} pending retries, waiting for {} in-flight reconciliations",
            self.timers.len(),
            self.running.len()
        );
        self.timers.abort_all();
        self.ready.clear();
        while let Some(joined) = self.running.join_next().await {
            if let Err(e) = joined {
                error!("Reconcile task failed to join: {}", e);
            }
        }
        info!("Reconcile engine stopped");
    }
}

#[cfg(test)]
mod engine_test;
