use crate::route::HttpRouteRuleSet;
use chrono::{DateTime, Utc};
use mesh_policy_controller_core::{
    access::SourceTls,
    certificate::Certificate,
    egress::GatewayMode,
    mesh_config::{FeatureFlags, LocalDnsProxy, MeshConfig},
    plugin::{PluginConfig, PluginSet},
    proxy::Probes,
    upstream::{ConnectionSettings, RetryPolicy, TcpRateLimit},
    IpNet, LbType, Protocol,
};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    net::IpAddr,
};

/// Cluster name to weight.
pub type WeightedClusters = BTreeMap<String, u32>;

/// The configuration published for one proxy.
///
/// Sections without content are omitted when serialized.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfigSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub spec: Spec,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateBlock>,

    #[serde(skip_serializing_if = "InboundConfig::is_empty")]
    pub inbound: InboundConfig,
    #[serde(skip_serializing_if = "OutboundConfig::is_empty")]
    pub outbound: OutboundConfig,
    #[serde(skip_serializing_if = "ForwardConfig::is_empty")]
    pub forward: ForwardConfig,
    #[serde(skip_serializing_if = "EgressConfig::is_empty")]
    pub egress: EgressConfig,

    /// Proxy address to a human-readable label.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub allowed_endpoints: BTreeMap<String, String>,

    /// Hostnames the proxy resolves itself.
    #[serde(rename = "dnsResolveDB", skip_serializing_if = "BTreeMap::is_empty")]
    pub dns_resolve_db: BTreeMap<String, Vec<IpAddr>>,

    /// Chain mount point to the plugins mounted there, in execution order.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub mounted_plugins: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    pub sidecar_log_level: String,
    pub feature_flags: FeatureFlags,
    pub traffic: TrafficSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_dns_proxy: Option<LocalDnsProxy>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster_set: BTreeMap<String, String>,
    pub probes: Probes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSpec {
    pub enable_egress: bool,
    pub enable_permissive_traffic_policy_mode: bool,
}

/// Identity credentials of the proxy.
///
/// Only the expiration is part of the policy content; key material is
/// attached when the snapshot is published.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    pub expiration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_chain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuing_ca: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundConfig {
    /// Target port to the matches listening on it.
    pub traffic_matches: BTreeMap<u16, Vec<InboundTrafficMatch>>,
    pub clusters_configs: BTreeMap<String, LocalClusterConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundTrafficMatch {
    pub port: u16,
    pub protocol: Protocol,

    /// Source network to its TLS requirements. Empty for mesh traffic.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub source_ip_ranges: BTreeMap<String, Option<SourceTls>>,
    pub target_clusters: WeightedClusters,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub http_service_route_rules: BTreeMap<String, HttpRouteRuleSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<TcpRateLimit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalClusterConfig {
    pub endpoints: BTreeMap<String, u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundConfig {
    /// Destination port to the matches listening on it.
    pub traffic_matches: BTreeMap<u16, Vec<OutboundTrafficMatch>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub clusters_configs: BTreeMap<String, ClusterConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundTrafficMatch {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
    pub destination_ip_ranges: Vec<IpNet>,
    pub target_clusters: WeightedClusters,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub http_service_route_rules: BTreeMap<String, HttpRouteRuleSet>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginConfig>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub allowed_egress_traffic: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub endpoints: BTreeMap<String, WeightedEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_settings: Option<ConnectionSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub active_health_check: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedEndpoint {
    pub weight: u32,

    /// The remote cluster serving this endpoint; unset for local endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lb_type: Option<LbType>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardConfig {
    /// Forwarding rule name to its gateway clusters.
    pub forward_matches: BTreeMap<String, WeightedClusters>,
    pub egress_gateways: BTreeMap<String, GatewayConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    pub endpoints: BTreeMap<String, u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressConfig {
    pub traffic_matches: BTreeMap<u16, Vec<EgressTrafficMatch>>,
    pub clusters_configs: BTreeMap<String, EgressClusterConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressTrafficMatch {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destination_ip_ranges: Vec<IpNet>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub server_names: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub target_clusters: WeightedClusters,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub http_service_route_rules: BTreeMap<String, HttpRouteRuleSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egress_forward_gateway: Option<String>,
}

/// An egress destination. Without endpoints, connections go to their
/// original destination.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressClusterConfig {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<String, u32>,
}

// === impl ProxyConfigSnapshot ===

impl ProxyConfigSnapshot {
    /// Copies mesh-wide settings into the spec section.
    pub fn set_mesh_config(&mut self, mesh: &MeshConfig) {
        self.spec.sidecar_log_level = mesh.sidecar_log_level.clone();
        self.spec.feature_flags = mesh.feature_flags.clone();
        self.spec.traffic = TrafficSpec {
            enable_egress: mesh.enable_egress,
            enable_permissive_traffic_policy_mode: mesh.permissive_traffic_policy_mode,
        };
        self.spec.local_dns_proxy = mesh.local_dns_proxy.clone();
        self.spec.cluster_set = mesh.cluster_set.clone();
    }

    pub fn set_probes(&mut self, probes: &Probes) {
        self.spec.probes = probes.clone();
    }

    /// Records the certificate's expiration. Credentials are only attached
    /// by [`Self::attach_credentials`].
    pub fn set_certificate_expiration(&mut self, expiration: DateTime<Utc>) {
        self.certificate = Some(CertificateBlock {
            common_name: None,
            expiration: format_expiration(expiration),
            cert_chain: None,
            private_key: None,
            issuing_ca: None,
        });
    }

    /// Fills in certificate material for publishing.
    pub fn attach_credentials(&mut self, cert: &Certificate) {
        self.certificate = Some(CertificateBlock {
            common_name: Some(cert.common_name.clone()),
            expiration: format_expiration(cert.expiration),
            cert_chain: Some(cert.cert_chain.clone()),
            private_key: Some(cert.private_key.clone()),
            issuing_ca: Some(cert.issuing_ca.clone()),
        });
    }

    /// Mounts plugins into a chain.
    ///
    /// Plugins not in `loaded` are dropped with a warning. Mounted plugins
    /// run in descending priority order.
    pub fn mount_plugins<'n>(
        &mut self,
        chain: &str,
        names: impl IntoIterator<Item = &'n String>,
        loaded: &PluginSet,
    ) {
        let mut mounted = self
            .mounted_plugins
            .remove(chain)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|name| loaded.get(&name).cloned())
            .collect::<Vec<_>>();
        for name in names {
            match loaded.get(name) {
                Some(plugin) if !mounted.iter().any(|p| p.name == plugin.name) => {
                    mounted.push(plugin.clone())
                }
                Some(_) => {}
                None => tracing::warn!(%chain, plugin = %name, "Dropping unknown plugin"),
            }
        }
        if mounted.is_empty() {
            return;
        }
        mounted.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.name.cmp(&b.name))
        });
        self.mounted_plugins
            .insert(chain.to_string(), mounted.into_iter().map(|p| p.name).collect());
    }
}

fn format_expiration(expiration: DateTime<Utc>) -> String {
    expiration.format("%Y-%m-%d %H:%M:%S").to_string()
}

// Key material is never printed.
impl std::fmt::Debug for CertificateBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBlock")
            .field("common_name", &self.common_name)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl InboundConfig {
    pub fn is_empty(&self) -> bool {
        self.traffic_matches.is_empty() && self.clusters_configs.is_empty()
    }
}

impl OutboundConfig {
    pub fn is_empty(&self) -> bool {
        self.traffic_matches.is_empty() && self.clusters_configs.is_empty()
    }
}

impl ForwardConfig {
    pub fn is_empty(&self) -> bool {
        self.forward_matches.is_empty() && self.egress_gateways.is_empty()
    }
}

impl EgressTrafficMatch {
    /// Tests whether connections are routed by HTTP host rather than by
    /// destination address or server name.
    pub fn is_host_routed(&self) -> bool {
        !self.protocol.is_tcp()
            && self.destination_ip_ranges.is_empty()
            && self.server_names.is_empty()
    }
}

impl EgressConfig {
    pub fn is_empty(&self) -> bool {
        self.traffic_matches.is_empty() && self.clusters_configs.is_empty()
    }
}
