use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mesh-wide settings and feature flags.
///
/// Compile jobs hold a shared snapshot of this for their whole duration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshConfig {
    #[serde(default)]
    pub permissive_traffic_policy_mode: bool,
    #[serde(default)]
    pub enable_egress: bool,
    #[serde(default, rename = "sidecarDisabledMTLS")]
    pub sidecar_disabled_mtls: bool,
    #[serde(default = "default_log_level")]
    pub sidecar_log_level: String,
    #[serde(default)]
    pub feature_flags: FeatureFlags,
    #[serde(default)]
    pub local_dns_proxy: Option<LocalDnsProxy>,

    /// Named properties of the cluster set this cluster belongs to.
    #[serde(default)]
    pub cluster_set: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    #[serde(default)]
    pub enable_sidecar_active_health_checks: bool,
    #[serde(default)]
    pub enable_plugin_policy: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDnsProxy {
    #[serde(default, rename = "primaryUpstreamDNSServerIPAddr")]
    pub primary_upstream: Option<String>,
    #[serde(default, rename = "secondaryUpstreamDNSServerIPAddr")]
    pub secondary_upstream: Option<String>,
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            permissive_traffic_policy_mode: false,
            enable_egress: false,
            sidecar_disabled_mtls: false,
            sidecar_log_level: default_log_level(),
            feature_flags: FeatureFlags::default(),
            local_dns_proxy: None,
            cluster_set: BTreeMap::new(),
        }
    }
}
