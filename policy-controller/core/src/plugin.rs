use crate::ServiceRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A script the proxy can load and mount into its filter chains.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Plugin {
    pub name: String,
    pub script: String,
    #[serde(default)]
    pub priority: f32,
}

/// The plugins currently loaded into the mesh, keyed by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PluginSet {
    plugins: BTreeMap<String, Plugin>,
}

/// Mounts plugins into chain positions on the proxies it selects.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginChain {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub selectors: ChainSelectors,
    pub chains: Vec<ChainMount>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSelectors {
    #[serde(default)]
    pub namespace_selector: Option<LabelSelector>,
    #[serde(default)]
    pub pod_selector: Option<LabelSelector>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

/// A chain position, e.g. `inbound-http`, and the plugins mounted there.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChainMount {
    pub name: String,
    pub plugins: Vec<String>,
}

/// Plugin configuration attached to one service's traffic.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PluginService {
    pub service: ServiceRef,
    #[serde(default)]
    pub inbound: InboundPlugins,
    #[serde(default)]
    pub outbound: OutboundPlugins,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct InboundPlugins {
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundPlugins {
    /// Applies to traffic toward every upstream service.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Applies only to traffic toward the named services.
    #[serde(default)]
    pub target_services: Vec<TargetServicePlugins>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TargetServicePlugins {
    pub namespace: String,
    pub name: String,
    pub plugins: Vec<PluginConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

// === impl PluginSet ===

impl PluginSet {
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.values()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl FromIterator<Plugin> for PluginSet {
    fn from_iter<T: IntoIterator<Item = Plugin>>(iter: T) -> Self {
        Self {
            plugins: iter.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }
}

// === impl PluginChain ===

impl PluginChain {
    /// Tests whether this chain applies to a workload. A missing selector
    /// matches everything.
    pub fn selects(
        &self,
        namespace_labels: &BTreeMap<String, String>,
        pod_labels: &BTreeMap<String, String>,
    ) -> bool {
        let ns = self
            .selectors
            .namespace_selector
            .as_ref()
            .map_or(true, |s| s.matches(namespace_labels));
        let pod = self
            .selectors
            .pod_selector
            .as_ref()
            .map_or(true, |s| s.matches(pod_labels));
        ns && pod
    }
}

// === impl LabelSelector ===

impl LabelSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

// === impl PluginService ===

impl PluginService {
    /// Plugins that apply to outbound traffic toward `target`.
    pub fn outbound_plugins_for<'a>(
        &'a self,
        target: &'a ServiceRef,
    ) -> impl Iterator<Item = &'a PluginConfig> + 'a {
        let targeted = self
            .outbound
            .target_services
            .iter()
            .filter(move |t| t.namespace == target.namespace && t.name == target.name)
            .flat_map(|t| t.plugins.iter());
        self.outbound.plugins.iter().chain(targeted)
    }
}
