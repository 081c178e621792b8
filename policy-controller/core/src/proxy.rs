use crate::ServiceIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, net::IpAddr};

/// A workload expected to run a proxy.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    /// The proxy's unique id.
    pub id: String,
    pub identity: ServiceIdentity,
    pub namespace: String,
    pub pod: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// The proxy's address, once known.
    #[serde(default)]
    pub addr: Option<IpAddr>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub probes: Probes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Probes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub startup_probes: Vec<Probe>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub liveness_probes: Vec<Probe>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readiness_probes: Vec<Probe>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_seconds: Option<u32>,
}

// === impl Workload ===

impl Workload {
    /// A human-readable label for the workload's address.
    pub fn label(&self) -> String {
        format!("{}/{}", self.namespace, self.pod)
    }
}
