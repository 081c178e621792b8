use serde::{Deserialize, Serialize};
use std::{fmt, net::IpAddr};

/// Identifies a service independent of its ports.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceRef {
    pub namespace: String,
    pub name: String,
}

/// A routable service port.
///
/// Services are uniquely keyed by `(namespace, name, port)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshService {
    pub namespace: String,
    pub name: String,
    pub port: u16,

    /// The port on the backing endpoints. Defaults to `port`.
    #[serde(default)]
    pub target_port: Option<u16>,

    #[serde(default)]
    pub protocol: Protocol,
}

/// Names the endpoints of a service on one target port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterRef {
    pub service: ServiceRef,
    pub target_port: u16,
}

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    #[default]
    Http,
    Https,
    Grpc,
    Tcp,
    TcpServerFirst,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,

    /// Set when the endpoint lives in a remote cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterTag>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTag {
    pub cluster: String,
    pub lb_type: LbType,
    #[serde(default)]
    pub weight: u32,
}

/// The multi-cluster role of a remote backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LbType {
    ActiveActive,
    FailOver,
}

/// Formats the key of a weighted endpoint. Addresses that already carry a
/// port are used as is.
pub fn endpoint_key(addr: &str, port: u16) -> String {
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return std::net::SocketAddr::new(ip, port).to_string();
    }
    match addr.rsplit_once(':') {
        Some((host, p)) if !host.is_empty() && p.parse::<u16>().is_ok() => addr.to_string(),
        _ => format!("{}:{}", addr, port),
    }
}

// === impl ServiceRef ===

impl ServiceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl MeshService ===

impl MeshService {
    pub fn service_ref(&self) -> ServiceRef {
        ServiceRef::new(&self.namespace, &self.name)
    }

    pub fn target_port(&self) -> u16 {
        self.target_port.unwrap_or(self.port)
    }

    pub fn cluster(&self) -> ClusterRef {
        ClusterRef {
            service: self.service_ref(),
            target_port: self.target_port(),
        }
    }

    /// The name of the outbound cluster for this service port.
    pub fn cluster_name(&self) -> String {
        self.cluster().name()
    }

    /// The name of the inbound cluster delivering to the local workload.
    pub fn local_cluster_name(&self) -> String {
        format!("{}|local", self.cluster_name())
    }

    pub fn fqdn(&self, cluster_domain: &str) -> String {
        format!("{}.{}.svc.{}", self.name, self.namespace, cluster_domain)
    }

    /// The host authorities a client may use to address this service.
    ///
    /// The bare service name is only resolvable from within the service's
    /// namespace.
    pub fn hostnames(&self, cluster_domain: &str, same_namespace: bool) -> Vec<String> {
        let mut hosts = Vec::new();
        if same_namespace {
            hosts.push(self.name.clone());
        }
        hosts.push(format!("{}.{}", self.name, self.namespace));
        hosts.push(format!("{}.{}.svc", self.name, self.namespace));
        hosts.push(format!("{}.{}.svc.cluster", self.name, self.namespace));
        hosts.push(self.fqdn(cluster_domain));

        let with_port = hosts
            .iter()
            .map(|h| format!("{}:{}", h, self.port))
            .collect::<Vec<_>>();
        hosts.extend(with_port);
        hosts
    }

    /// Names the traffic match for this service port.
    pub fn traffic_match_name(&self, direction: &str) -> String {
        format!(
            "{}_{}/{}_{}_{}",
            direction,
            self.namespace,
            self.name,
            self.port,
            self.protocol.as_match_str()
        )
    }
}

impl fmt::Display for MeshService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.name, self.port)
    }
}

// === impl ClusterRef ===

impl ClusterRef {
    pub fn name(&self) -> String {
        format!("{}|{}", self.service, self.target_port)
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.service, self.target_port)
    }
}

// === impl Protocol ===

impl Protocol {
    pub fn is_tcp(self) -> bool {
        matches!(self, Self::Tcp | Self::TcpServerFirst)
    }

    /// The protocol as it appears in a traffic match. Server-first TCP is
    /// demultiplexed like any other TCP stream.
    pub fn as_match_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Grpc => "grpc",
            Self::Tcp | Self::TcpServerFirst => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TcpServerFirst => f.write_str("tcp-server-first"),
            p => f.write_str(p.as_match_str()),
        }
    }
}

// === impl Endpoint ===

impl Endpoint {
    pub fn is_local(&self) -> bool {
        self.cluster.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc() -> MeshService {
        MeshService {
            namespace: "ns".to_string(),
            name: "b".to_string(),
            port: 8080,
            target_port: Some(9090),
            protocol: Protocol::Http,
        }
    }

    #[test]
    fn cluster_names() {
        assert_eq!(svc().cluster_name(), "ns/b|9090");
        assert_eq!(svc().local_cluster_name(), "ns/b|9090|local");
        let svc = MeshService {
            target_port: None,
            ..svc()
        };
        assert_eq!(svc.cluster_name(), "ns/b|8080");
    }

    #[test]
    fn short_hostnames_only_in_namespace() {
        let same = svc().hostnames("cluster.local", true);
        assert!(same.contains(&"b".to_string()));
        assert!(same.contains(&"b:8080".to_string()));
        assert!(same.contains(&"b.ns.svc.cluster.local:8080".to_string()));

        let other = svc().hostnames("cluster.local", false);
        assert!(!other.contains(&"b".to_string()));
        assert!(other.contains(&"b.ns".to_string()));
        assert_eq!(other.len(), 8);
    }

    #[test]
    fn endpoint_keys() {
        assert_eq!(endpoint_key("10.0.0.1", 80), "10.0.0.1:80");
        assert_eq!(endpoint_key("10.0.0.1:8080", 80), "10.0.0.1:8080");
        assert_eq!(endpoint_key("fd00::1", 80), "[fd00::1]:80");
        assert_eq!(endpoint_key("example.com", 443), "example.com:443");
        assert_eq!(endpoint_key("example.com:8443", 443), "example.com:8443");
    }

    #[test]
    fn server_first_matches_as_tcp() {
        assert_eq!(Protocol::TcpServerFirst.as_match_str(), "tcp");
        assert_eq!(Protocol::TcpServerFirst.to_string(), "tcp-server-first");
        assert!(Protocol::TcpServerFirst.is_tcp());
        assert!(!Protocol::Grpc.is_tcp());
    }
}
