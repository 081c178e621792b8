use crate::{
    access::SourceTls,
    http_route::HttpMatch,
    plugin::PluginConfig,
    upstream::{HeaderRateLimit, HttpRateLimit, TcpRateLimit},
    IpNet, Protocol, WeightedCluster,
};

/// Inbound policy resolved for the services a proxy fronts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundPolicy {
    pub traffic_matches: Vec<InboundTrafficMatch>,
    pub route_configs: Vec<InboundRouteConfig>,
    pub clusters: Vec<LocalCluster>,
}

/// Demultiplexes connections arriving on one target port.
///
/// Mesh traffic carries no source ranges; traffic admitted by network
/// (ingress, export, access control) is matched by its source ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundTrafficMatch {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
    pub sources: Vec<SourceRange>,
    pub clusters: Vec<WeightedCluster>,
    pub rate_limit: Option<TcpRateLimit>,
    pub plugins: Vec<PluginConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub net: IpNet,
    pub tls: Option<SourceTls>,
}

/// HTTP routes for one fronted service on one target port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRouteConfig {
    pub port: u16,

    /// Source ranges of the traffic match these routes belong to.
    pub sources: Vec<SourceRange>,
    pub name: String,
    pub hostnames: Vec<String>,
    pub rules: Vec<InboundRouteRule>,
    pub rate_limit: Option<HttpRateLimit>,
    pub header_rate_limits: Vec<HeaderRateLimit>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRouteRule {
    pub http_match: HttpMatch,
    pub clusters: Vec<WeightedCluster>,

    /// Principals allowed to use this route; `*` allows any.
    pub allowed_principals: Vec<String>,
    pub rate_limit: Option<HttpRateLimit>,
}

/// Delivers inbound traffic to the local workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalCluster {
    pub name: String,
    pub port: u16,
}
