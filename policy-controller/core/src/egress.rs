use crate::{
    outbound::RouteMatchGroup, IpNet, Protocol, ServiceIdentity, ServiceRef, WeightedCluster,
};
use serde::{Deserialize, Serialize};

/// The name of the forwarding rule that applies when no named rule selects
/// an egress policy.
pub const DEFAULT_FORWARD_RULE: &str = "*";

/// Permits source identities to reach destinations outside the mesh.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Egress {
    pub name: String,
    pub namespace: String,
    pub sources: Vec<ServiceIdentity>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<IpNet>,
    pub ports: Vec<EgressPort>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EgressPort {
    pub number: u16,
    pub protocol: Protocol,
}

/// Routes egress traffic through gateway services instead of directly to
/// its destination.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct EgressGatewayPolicy {
    /// Gateways for egress traffic not selected by any rule.
    #[serde(default)]
    pub global: Vec<GatewayTarget>,
    #[serde(default)]
    pub rules: Vec<EgressGatewayRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressGatewayRule {
    pub name: String,
    pub egress_policies: Vec<PolicyRef>,
    pub gateways: Vec<GatewayTarget>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct PolicyRef {
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct GatewayTarget {
    pub service: ServiceRef,
    pub port: u16,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub mode: GatewayMode,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayMode {
    #[default]
    Http2Tunnel,
    Socks5,
}

/// Egress routing resolved for one identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EgressTrafficPolicy {
    pub traffic_matches: Vec<EgressTrafficMatch>,
    pub route_configs: Vec<EgressRouteConfig>,
    pub clusters: Vec<EgressCluster>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EgressTrafficMatch {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
    pub destination_ranges: Vec<IpNet>,

    /// TLS server names selecting HTTPS destinations.
    pub server_names: Vec<String>,
    pub clusters: Vec<WeightedCluster>,
    pub forward_gateway: Option<String>,
}

/// HTTP routes toward one external host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EgressRouteConfig {
    pub port: u16,
    pub host: String,
    pub hostnames: Vec<String>,
    pub routes: Vec<RouteMatchGroup>,
    pub forward_gateway: Option<String>,
}

/// An external destination reached directly by the proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EgressCluster {
    pub name: String,

    /// The upstream address, or `None` to connect to the original
    /// destination.
    pub address: Option<String>,
}

/// Egress gateway forwarding resolved for one identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ForwardPolicy {
    pub matches: Vec<ForwardMatch>,
    pub gateways: Vec<GatewayCluster>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardMatch {
    pub rule: String,
    pub clusters: Vec<WeightedCluster>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayCluster {
    pub name: String,
    pub mode: GatewayMode,

    /// `host:port` endpoints with their declared weights.
    pub endpoints: Vec<(String, u32)>,
}

// === impl Egress ===

impl Egress {
    pub fn policy_ref(&self) -> PolicyRef {
        PolicyRef {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

// === impl EgressGatewayPolicy ===

impl EgressGatewayPolicy {
    /// The forwarding rule that carries traffic for an egress policy, if
    /// any gateway applies to it.
    pub fn rule_for(&self, egress: &PolicyRef) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.egress_policies.contains(egress))
            .map(|r| r.name.as_str())
            .or_else(|| (!self.global.is_empty()).then_some(DEFAULT_FORWARD_RULE))
    }
}

// === impl GatewayTarget ===

impl GatewayTarget {
    pub fn cluster_name(&self) -> String {
        format!("{}|{}", self.service, self.port)
    }
}
