use crate::{proxy::ProxyState, CertBinder, Job, Metrics, Proxy, ProxyRegistry, Publisher};
use mesh_policy_controller_core::{
    mesh_config::MeshConfig, plugin::PluginSet, proxy::Workload, NotReady, Readiness,
    ResourceDirectory,
};
use mesh_policy_controller_resolver::Resolver;
use mesh_policy_controller_snapshot::{plugin_set_version, Fingerprint, ProxyConfigSnapshot};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info_span, Instrument};

/// Compiles proxy configurations and hands them to the [`Publisher`].
pub struct Compiler {
    directory: Arc<dyn ResourceDirectory>,
    resolver: Resolver,
    registry: Arc<ProxyRegistry>,
    certs: CertBinder,
    publisher: Publisher,
    metrics: Metrics,
}

/// The result of one compile job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A new configuration was written with this version.
    Published(Fingerprint),

    /// The configuration matched what was last published.
    Unchanged,

    /// Data the configuration depends on has not been observed yet.
    NotReady { reason: String },

    /// The configuration could not be published.
    Failed,

    /// The proxy is no longer connected.
    Disconnected,
}

// === impl Compiler ===

impl Compiler {
    pub fn new(
        directory: Arc<dyn ResourceDirectory>,
        resolver: Resolver,
        registry: Arc<ProxyRegistry>,
        certs: CertBinder,
        publisher: Publisher,
        metrics: Metrics,
    ) -> Self {
        Self {
            directory,
            resolver,
            registry,
            certs,
            publisher,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<ProxyRegistry> {
        &self.registry
    }

    /// Compiles and publishes a proxy's configuration.
    ///
    /// The proxy's lock is held for the whole job. Mesh settings and the
    /// plugin set are read once, so one job sees a consistent view of them.
    pub async fn compile(&self, proxy: &Proxy) -> Outcome {
        let span = info_span!("compile", proxy = %proxy);
        async move {
            let started = Instant::now();
            let mut state = proxy.lock().await;
            let workload = proxy.workload();
            let mesh = self.directory.mesh_config();
            let plugins = self.directory.plugin_set();

            let outcome = match self.build(&workload, &mesh, &plugins, &mut state).await {
                Ok(snapshot) => {
                    self.publisher
                        .publish(
                            &proxy.config_key(),
                            snapshot,
                            &plugin_set_version(&plugins),
                            &mut state,
                        )
                        .await
                }
                Err(not_ready) => {
                    tracing::debug!(reason = %not_ready, "Configuration not ready");
                    Outcome::from(not_ready)
                }
            };
            self.metrics.compiled(&outcome, started.elapsed());
            outcome
        }
        .instrument(span)
        .await
    }

    async fn build(
        &self,
        workload: &Workload,
        mesh: &MeshConfig,
        plugins: &PluginSet,
        state: &mut ProxyState,
    ) -> Readiness<ProxyConfigSnapshot> {
        let id = &workload.identity;
        let mut snapshot = ProxyConfigSnapshot::default();

        snapshot.set_probes(&workload.probes);
        snapshot.set_mesh_config(mesh);

        self.certs
            .bind(mesh, workload, &mut state.certificate)
            .await;
        if let Some(cert) = state.certificate.as_ref() {
            snapshot.set_certificate_expiration(cert.expiration);
        }

        if mesh.feature_flags.enable_plugin_policy {
            self.mount_plugins(workload, plugins, &mut snapshot);
        }

        let services = self.directory.services_for_identity(id);
        snapshot.merge_inbound(self.resolver.inbound(mesh, id, &services));
        for svc in &services {
            snapshot.merge_inbound(self.resolver.inbound_sources(svc));
        }

        let outbound = self.resolver.outbound(mesh, id, &services);
        let clusters = outbound.clusters.clone();
        snapshot.merge_outbound(outbound);
        if !clusters.is_empty() {
            let configs = self.resolver.outbound_clusters(mesh, id, &clusters)?;
            snapshot.merge_outbound_clusters(configs);
        }

        snapshot.merge_egress(self.resolver.egress(id)?);
        snapshot.merge_forward(self.resolver.forward()?);

        snapshot.rebalance();
        snapshot.reorder();
        snapshot.set_allowed_endpoints(&self.registry.workloads())?;

        Ok(snapshot)
    }

    fn mount_plugins(
        &self,
        workload: &Workload,
        plugins: &PluginSet,
        snapshot: &mut ProxyConfigSnapshot,
    ) {
        let namespace_labels = match self.directory.namespace(&workload.namespace) {
            Some(ns) => ns.labels,
            None => {
                tracing::warn!(namespace = %workload.namespace, "Namespace not found for plugin chains");
                Default::default()
            }
        };
        for chain in self.directory.plugin_chains() {
            if !chain.selects(&namespace_labels, &workload.labels) {
                continue;
            }
            tracing::trace!(chain = %chain.name, "Plugin chain selects proxy");
            for mount in &chain.chains {
                snapshot.mount_plugins(&mount.name, &mount.plugins, plugins);
            }
        }
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("resolver", &self.resolver)
            .field("certs", &self.certs)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Job for Compiler {
    async fn run(&self, id: &str) -> Outcome {
        match self.registry.get(id) {
            Some(proxy) => self.compile(&proxy).await,
            None => Outcome::Disconnected,
        }
    }
}

// === impl Outcome ===

impl Outcome {
    /// Whether the job should run again even if nothing else triggers it.
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::NotReady { .. } | Self::Failed)
    }

    pub(crate) fn as_label(&self) -> Option<&'static str> {
        match self {
            Self::Published(_) => Some("published"),
            Self::Unchanged => Some("unchanged"),
            Self::NotReady { .. } => Some("not_ready"),
            Self::Failed => Some("failed"),
            Self::Disconnected => None,
        }
    }
}

impl From<NotReady> for Outcome {
    fn from(not_ready: NotReady) -> Self {
        Self::NotReady {
            reason: not_ready.reason().to_string(),
        }
    }
}
