use crate::{
    access::{AccessRule, SourcePolicy},
    egress::{Egress, EgressGatewayPolicy},
    mesh_config::MeshConfig,
    plugin::{PluginChain, PluginService, PluginSet},
    proxy::Workload,
    split::{HttpRouteGroup, TrafficSplit},
    upstream::{RetryPolicy, UpstreamTrafficSetting},
    Endpoint, LbType, MeshService, ServiceIdentity, ServiceRef,
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;

/// A namespace known to the mesh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
    pub labels: BTreeMap<String, String>,

    /// Whether workloads in the namespace are part of the mesh.
    pub monitored: bool,
}

/// Read-only view of the mesh's declared resources.
///
/// Reads are synchronous and served from a cache that may lag behind the
/// source of truth. Lookups that return `Option` distinguish data that has
/// not been observed yet (`None`) from data that is known to be empty.
pub trait ResourceDirectory: Send + Sync {
    /// Watches a generation counter that advances on every change.
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Whether the initial state has been loaded.
    fn is_synced(&self) -> bool;

    fn mesh_config(&self) -> Arc<MeshConfig>;

    fn plugin_set(&self) -> Arc<PluginSet>;

    fn namespace(&self, name: &str) -> Option<Namespace>;

    /// Every service port in the mesh.
    fn services(&self) -> Vec<MeshService>;

    /// The service ports backed by workloads with the given identity.
    fn services_for_identity(&self, id: &ServiceIdentity) -> Vec<MeshService>;

    /// Workloads expected to run a proxy.
    fn workloads(&self) -> Vec<Workload>;

    /// Access rules that name `id` as a source or as the destination.
    fn access_rules(&self, id: &ServiceIdentity) -> Vec<AccessRule>;

    /// Traffic splits whose apex is `service`.
    fn splits_for(&self, service: &ServiceRef) -> Vec<TrafficSplit>;

    fn http_route_group(&self, namespace: &str, name: &str) -> Option<HttpRouteGroup>;

    /// The local target port serving `port` on a service.
    fn target_port(&self, service: &ServiceRef, port: u16) -> Option<u16>;

    /// Target ports in remote clusters serving `port` on a service, with
    /// their multi-cluster role.
    fn multicluster_target_ports(&self, service: &ServiceRef, port: u16) -> Vec<(u16, LbType)>;

    /// The multi-cluster role and weight of a service imported from a remote
    /// cluster.
    fn multicluster_lb(&self, service: &MeshService) -> Option<(LbType, u32)>;

    fn endpoints(&self, service: &ServiceRef) -> Option<Vec<Endpoint>>;

    fn egress_policies(&self, id: &ServiceIdentity) -> Option<Vec<Egress>>;

    fn egress_gateway_policy(&self) -> Option<EgressGatewayPolicy>;

    fn plugin_chains(&self) -> Vec<PluginChain>;

    fn plugin_service(&self, service: &ServiceRef) -> Option<PluginService>;

    fn retry_policy(&self, id: &ServiceIdentity, service: &ServiceRef) -> Option<RetryPolicy>;

    fn upstream_traffic_setting(&self, service: &ServiceRef) -> Option<UpstreamTrafficSetting>;

    /// Ingress, access-control and export policies fronting a service.
    fn source_policies(&self, service: &ServiceRef) -> Vec<SourcePolicy>;
}
