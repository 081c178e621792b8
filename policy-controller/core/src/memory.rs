//! A [`ResourceDirectory`] backed by an in-memory resource document.

use crate::{
    access::{AccessRule, SourcePolicy},
    directory::{Namespace, ResourceDirectory},
    egress::{Egress, EgressGatewayPolicy},
    mesh_config::MeshConfig,
    plugin::{Plugin, PluginChain, PluginService, PluginSet},
    proxy::Workload,
    split::{HttpRouteGroup, TrafficSplit},
    upstream::{RetryPolicy, UpstreamTrafficSetting},
    Endpoint, LbType, MeshService, Protocol, ServiceIdentity, ServiceRef,
};
use ahash::AHashSet as HashSet;
use parking_lot::RwLock;
use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;

/// Every resource the directory serves.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDocument {
    #[serde(default)]
    pub mesh_config: MeshConfig,
    #[serde(default)]
    pub namespaces: Vec<NamespaceSpec>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub workloads: Vec<Workload>,
    #[serde(default)]
    pub access_rules: Vec<AccessRule>,
    #[serde(default)]
    pub traffic_splits: Vec<TrafficSplit>,
    #[serde(default)]
    pub http_route_groups: Vec<HttpRouteGroup>,
    #[serde(default)]
    pub egresses: Vec<Egress>,
    #[serde(default)]
    pub egress_gateway: Option<EgressGatewayPolicy>,
    #[serde(default)]
    pub plugins: Vec<Plugin>,
    #[serde(default)]
    pub plugin_chains: Vec<PluginChain>,
    #[serde(default)]
    pub plugin_services: Vec<PluginService>,
    #[serde(default)]
    pub retry_policies: Vec<RetryPolicyBinding>,
    #[serde(default)]
    pub upstream_traffic_settings: Vec<UpstreamTrafficSetting>,
    #[serde(default)]
    pub source_policies: Vec<SourcePolicyBinding>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NamespaceSpec {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub namespace: String,
    pub name: String,

    /// The identity of the workloads backing this service.
    #[serde(default)]
    pub identity: Option<ServiceIdentity>,
    pub ports: Vec<ServicePort>,

    /// Unset until endpoints have been observed.
    #[serde(default)]
    pub endpoints: Option<Vec<Endpoint>>,

    /// Ports exposed for this service by remote clusters.
    #[serde(default)]
    pub remote_ports: Vec<RemotePort>,

    /// Set when the service is imported from a remote cluster.
    #[serde(default)]
    pub multicluster: Option<MulticlusterLb>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub port: u16,
    #[serde(default)]
    pub target_port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePort {
    pub port: u16,
    pub target_port: u16,
    pub lb_type: LbType,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticlusterLb {
    pub lb_type: LbType,
    #[serde(default)]
    pub weight: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RetryPolicyBinding {
    pub source: ServiceIdentity,
    pub destination: ServiceRef,
    pub policy: RetryPolicy,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SourcePolicyBinding {
    pub service: ServiceRef,
    #[serde(flatten)]
    pub policy: SourcePolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to parse resources: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("service port {0} is declared more than once")]
    DuplicateServicePort(String),
}

#[derive(Debug)]
pub struct MemoryDirectory {
    state: RwLock<State>,
    generation: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct State {
    doc: ResourceDocument,
    synced: bool,
    mesh_config: Arc<MeshConfig>,
    plugin_set: Arc<PluginSet>,
}

// === impl ResourceDocument ===

impl ResourceDocument {
    pub fn from_json(bytes: &[u8]) -> Result<Self, DirectoryError> {
        let doc = serde_json::from_slice::<Self>(bytes)?;
        doc.validate()?;
        Ok(doc)
    }

    fn validate(&self) -> Result<(), DirectoryError> {
        let mut seen = HashSet::new();
        for svc in self.mesh_services() {
            if !seen.insert((svc.namespace.clone(), svc.name.clone(), svc.port)) {
                return Err(DirectoryError::DuplicateServicePort(svc.to_string()));
            }
        }
        Ok(())
    }

    fn mesh_services(&self) -> impl Iterator<Item = MeshService> + '_ {
        self.services.iter().flat_map(ServiceSpec::mesh_services)
    }

    fn service(&self, svc: &ServiceRef) -> Option<&ServiceSpec> {
        self.services
            .iter()
            .find(|s| s.namespace == svc.namespace && s.name == svc.name)
    }
}

// === impl ServiceSpec ===

impl ServiceSpec {
    fn mesh_services(&self) -> impl Iterator<Item = MeshService> + '_ {
        self.ports.iter().map(|p| MeshService {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            port: p.port,
            target_port: p.target_port,
            protocol: p.protocol,
        })
    }
}

// === impl MemoryDirectory ===

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    /// Creates a directory that has not loaded any resources yet.
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            state: RwLock::new(State::default()),
            generation,
        }
    }

    pub fn from_document(doc: ResourceDocument) -> Self {
        let dir = Self::new();
        dir.replace(doc);
        dir
    }

    /// Replaces every resource and notifies subscribers.
    pub fn replace(&self, doc: ResourceDocument) {
        {
            let mut state = self.state.write();
            state.mesh_config = Arc::new(doc.mesh_config.clone());
            state.plugin_set = Arc::new(doc.plugins.iter().cloned().collect());
            state.doc = doc;
            state.synced = true;
        }
        self.generation.send_modify(|g| *g += 1);
        tracing::debug!(generation = *self.generation.borrow(), "Resources updated");
    }

    /// Applies an in-place edit to the current resources and notifies
    /// subscribers.
    pub fn update(&self, f: impl FnOnce(&mut ResourceDocument)) {
        let mut doc = self.state.read().doc.clone();
        f(&mut doc);
        self.replace(doc);
    }
}

impl ResourceDirectory for MemoryDirectory {
    fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn is_synced(&self) -> bool {
        self.state.read().synced
    }

    fn mesh_config(&self) -> Arc<MeshConfig> {
        self.state.read().mesh_config.clone()
    }

    fn plugin_set(&self) -> Arc<PluginSet> {
        self.state.read().plugin_set.clone()
    }

    fn namespace(&self, name: &str) -> Option<Namespace> {
        let state = self.state.read();
        state
            .doc
            .namespaces
            .iter()
            .find(|ns| ns.name == name)
            .map(|ns| Namespace {
                name: ns.name.clone(),
                labels: ns.labels.clone(),
                monitored: true,
            })
    }

    fn services(&self) -> Vec<MeshService> {
        self.state.read().doc.mesh_services().collect()
    }

    fn services_for_identity(&self, id: &ServiceIdentity) -> Vec<MeshService> {
        let state = self.state.read();
        state
            .doc
            .services
            .iter()
            .filter(|s| s.identity.as_ref() == Some(id))
            .flat_map(ServiceSpec::mesh_services)
            .collect()
    }

    fn workloads(&self) -> Vec<Workload> {
        self.state.read().doc.workloads.clone()
    }

    fn access_rules(&self, id: &ServiceIdentity) -> Vec<AccessRule> {
        let state = self.state.read();
        state
            .doc
            .access_rules
            .iter()
            .filter(|r| r.destination == *id || r.allows_source(id))
            .cloned()
            .collect()
    }

    fn splits_for(&self, service: &ServiceRef) -> Vec<TrafficSplit> {
        let state = self.state.read();
        state
            .doc
            .traffic_splits
            .iter()
            .filter(|s| s.namespace == service.namespace && s.apex == service.name)
            .cloned()
            .collect()
    }

    fn http_route_group(&self, namespace: &str, name: &str) -> Option<HttpRouteGroup> {
        let state = self.state.read();
        state
            .doc
            .http_route_groups
            .iter()
            .find(|g| g.namespace == namespace && g.name == name)
            .cloned()
    }

    fn target_port(&self, service: &ServiceRef, port: u16) -> Option<u16> {
        let state = self.state.read();
        let spec = state.doc.service(service)?;
        spec.ports
            .iter()
            .find(|p| p.port == port)
            .map(|p| p.target_port.unwrap_or(p.port))
    }

    fn multicluster_target_ports(&self, service: &ServiceRef, port: u16) -> Vec<(u16, LbType)> {
        let state = self.state.read();
        state
            .doc
            .service(service)
            .map(|spec| {
                spec.remote_ports
                    .iter()
                    .filter(|p| p.port == port)
                    .map(|p| (p.target_port, p.lb_type))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn multicluster_lb(&self, service: &MeshService) -> Option<(LbType, u32)> {
        let state = self.state.read();
        let spec = state.doc.service(&service.service_ref())?;
        spec.multicluster.as_ref().map(|m| (m.lb_type, m.weight))
    }

    fn endpoints(&self, service: &ServiceRef) -> Option<Vec<Endpoint>> {
        let state = self.state.read();
        state.doc.service(service)?.endpoints.clone()
    }

    fn egress_policies(&self, id: &ServiceIdentity) -> Option<Vec<Egress>> {
        let state = self.state.read();
        if !state.synced {
            return None;
        }
        let egresses = state
            .doc
            .egresses
            .iter()
            .filter(|e| e.sources.contains(id))
            .cloned()
            .collect();
        Some(egresses)
    }

    fn egress_gateway_policy(&self) -> Option<EgressGatewayPolicy> {
        self.state.read().doc.egress_gateway.clone()
    }

    fn plugin_chains(&self) -> Vec<PluginChain> {
        self.state.read().doc.plugin_chains.clone()
    }

    fn plugin_service(&self, service: &ServiceRef) -> Option<PluginService> {
        let state = self.state.read();
        state
            .doc
            .plugin_services
            .iter()
            .find(|p| p.service == *service)
            .cloned()
    }

    fn retry_policy(&self, id: &ServiceIdentity, service: &ServiceRef) -> Option<RetryPolicy> {
        let state = self.state.read();
        state
            .doc
            .retry_policies
            .iter()
            .find(|r| r.source == *id && r.destination == *service)
            .map(|r| r.policy.clone())
    }

    fn upstream_traffic_setting(&self, service: &ServiceRef) -> Option<UpstreamTrafficSetting> {
        let state = self.state.read();
        state
            .doc
            .upstream_traffic_settings
            .iter()
            .find(|s| s.service == *service)
            .cloned()
    }

    fn source_policies(&self, service: &ServiceRef) -> Vec<SourcePolicy> {
        let state = self.state.read();
        state
            .doc
            .source_policies
            .iter()
            .filter(|b| b.service == *service)
            .map(|b| b.policy.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests;
