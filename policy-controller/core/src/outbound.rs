use crate::{
    http_route::HttpMatch,
    plugin::PluginConfig,
    upstream::{ConnectionSettings, RetryPolicy},
    ClusterRef, Endpoint, IpNet, MeshService, WeightedCluster,
};
use std::{collections::BTreeMap, net::IpAddr};

/// Outbound mesh policy resolved for one identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutboundPolicy {
    pub traffic_matches: Vec<OutboundTrafficMatch>,

    /// HTTP routes per upstream service port. TCP services have none.
    pub route_configs: Vec<OutboundRouteConfig>,

    /// Clusters referenced by this policy, in first-seen order.
    pub clusters: Vec<ClusterRef>,

    /// Services the proxy must resolve itself, by FQDN.
    pub dns_resolvable: BTreeMap<String, Vec<IpAddr>>,
}

/// Demultiplexes connections to one upstream service port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundTrafficMatch {
    pub name: String,
    pub service: MeshService,
    pub destination_ranges: Vec<IpNet>,
    pub clusters: Vec<WeightedCluster>,
    pub plugins: Vec<PluginConfig>,

    /// Traffic toward this service may leave the mesh.
    pub egress: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundRouteConfig {
    pub service: MeshService,

    /// The service's FQDN, naming the rule set.
    pub name: String,
    pub hostnames: Vec<String>,
    pub routes: Vec<RouteMatchGroup>,
    pub retry_policy: Option<RetryPolicy>,
}

/// A request match and the clusters it routes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMatchGroup {
    pub http_match: HttpMatch,
    pub clusters: Vec<WeightedCluster>,
}

/// The endpoints and settings backing an outbound cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
    pub connection_settings: Option<ConnectionSettings>,
    pub retry_policy: Option<RetryPolicy>,
    pub active_health_checks: bool,
}

// === impl OutboundPolicy ===

impl OutboundPolicy {
    pub fn is_empty(&self) -> bool {
        self.traffic_matches.is_empty() && self.route_configs.is_empty()
    }
}
