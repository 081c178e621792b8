use crate::{Job, Metrics, ProxyRegistry, Scheduler};
use mesh_policy_controller_core::ResourceDirectory;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{self, Instant, MissedTickBehavior},
};

/// Keeps the proxy registry in step with the directory and schedules
/// compiles for every proxy whenever resources change.
pub struct Reconciler<J> {
    directory: Arc<dyn ResourceDirectory>,
    registry: Arc<ProxyRegistry>,
    scheduler: Scheduler<J>,
    metrics: Metrics,
    resync: Duration,
    ready: watch::Sender<bool>,
}

// === impl Reconciler ===

impl<J: Job> Reconciler<J> {
    pub fn new(
        directory: Arc<dyn ResourceDirectory>,
        registry: Arc<ProxyRegistry>,
        scheduler: Scheduler<J>,
        metrics: Metrics,
        resync: Duration,
        ready: watch::Sender<bool>,
    ) -> Self {
        Self {
            directory,
            registry,
            scheduler,
            metrics,
            resync,
            ready,
        }
    }

    pub async fn run(self) {
        let mut updates = self.directory.subscribe();
        let mut resync = time::interval_at(Instant::now() + self.resync, self.resync);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.reconcile();
        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Resource directory closed");
                        return;
                    }
                    tracing::debug!(generation = *updates.borrow_and_update(), "Resources changed");
                    self.reconcile();
                }
                _ = resync.tick() => {
                    tracing::debug!("Resyncing proxies");
                    self.reconcile();
                }
            }
        }
    }

    /// Syncs the registry and triggers every connected proxy. Returns false
    /// while the directory has not loaded.
    fn reconcile(&self) -> bool {
        if !self.directory.is_synced() {
            tracing::debug!("Waiting for resources");
            return false;
        }

        let changes = self.registry.sync(self.directory.workloads());
        if !changes.updated.is_empty() || !changes.disconnected.is_empty() {
            tracing::info!(
                updated = ?changes.updated,
                disconnected = ?changes.disconnected,
                "Proxies changed"
            );
        }
        self.metrics.set_proxies(self.registry.len());
        self.scheduler.trigger_all(self.registry.ids());

        self.ready.send_if_modified(|ready| !std::mem::replace(ready, true));
        true
    }
}

impl<J> std::fmt::Debug for Reconciler<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("resync", &self.resync)
            .finish_non_exhaustive()
    }
}
