use crate::{split::RouteGroupRef, IpNet, Protocol, ServiceIdentity};
use serde::{Deserialize, Serialize};

/// Grants source identities access to a destination identity.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AccessRule {
    pub name: String,
    pub namespace: String,
    pub destination: ServiceIdentity,
    pub sources: Vec<ServiceIdentity>,

    /// The routes the sources may use. When empty, every route is allowed.
    #[serde(default)]
    pub rules: Vec<RouteGroupRef>,
}

/// Admits traffic that does not originate from a mesh identity, keyed by
/// source network.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePolicy {
    pub kind: SourceKind,
    pub name: String,

    /// The target port on the fronted service.
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    pub sources: Vec<IpNet>,

    #[serde(default)]
    pub tls: Option<SourceTls>,

    /// Path regexes admitted from these sources. Empty admits every path.
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Ingress,
    AccessControl,
    Export,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTls {
    #[serde(default)]
    pub skip_client_cert_validation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sni_hosts: Vec<String>,
}

// === impl AccessRule ===

impl AccessRule {
    pub fn allows_source(&self, id: &ServiceIdentity) -> bool {
        self.sources.iter().any(|s| s == id)
    }
}
