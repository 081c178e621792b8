use crate::WeightedClusters;
use mesh_policy_controller_core::{
    http_route::{HttpMatch, PathMatchKind},
    upstream::{HeaderRateLimit, HttpRateLimit, RetryPolicy},
    WeightedCluster, WILDCARD,
};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// A set of allowed names in which `*` absorbs every other entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allowed {
    any: bool,
    names: BTreeSet<String>,
}

/// The HTTP routes of one service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRuleSet {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    pub route_rules: Vec<HttpRouteRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<HttpRateLimit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub header_rate_limits: Vec<HeaderRateLimit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egress_forward_gateway: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    pub path: String,
    #[serde(rename = "type")]
    pub path_kind: PathMatchKind,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub methods: Allowed,
    pub target_clusters: WeightedClusters,

    /// Principals allowed to use the route. Unset on outbound routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_services: Option<Allowed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<HttpRateLimit>,

    #[serde(skip)]
    key: HttpMatch,
}

// === impl Allowed ===

impl Allowed {
    pub fn insert(&mut self, name: &str) {
        if self.any {
            return;
        }
        if name == WILDCARD {
            self.any = true;
            self.names.clear();
        } else {
            self.names.insert(name.to_string());
        }
    }

    pub fn is_any(&self) -> bool {
        self.any
    }

    pub fn contains(&self, name: &str) -> bool {
        self.any || self.names.contains(name)
    }
}

impl<'s> Extend<&'s String> for Allowed {
    fn extend<T: IntoIterator<Item = &'s String>>(&mut self, iter: T) {
        for name in iter {
            self.insert(name);
        }
    }
}

impl<'s> FromIterator<&'s String> for Allowed {
    fn from_iter<T: IntoIterator<Item = &'s String>>(iter: T) -> Self {
        let mut allowed = Self::default();
        allowed.extend(iter);
        allowed
    }
}

impl Serialize for Allowed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.any {
            serializer.collect_seq(std::iter::once(WILDCARD))
        } else {
            serializer.collect_seq(&self.names)
        }
    }
}

// === impl HttpRouteRuleSet ===

impl HttpRouteRuleSet {
    /// Adds a route, reusing a structurally equal rule if one exists.
    ///
    /// A reused rule gains the route's clusters it does not already target
    /// and the route's principals.
    pub fn merge_route(
        &mut self,
        http_match: &HttpMatch,
        clusters: &[WeightedCluster],
        principals: Option<&[String]>,
        rate_limit: Option<HttpRateLimit>,
    ) {
        let idx = match self.route_rules.iter().position(|r| r.key == *http_match) {
            Some(idx) => idx,
            None => {
                self.route_rules.push(HttpRouteRule::new(http_match));
                self.route_rules.len() - 1
            }
        };
        let rule = &mut self.route_rules[idx];
        for wc in clusters {
            rule.target_clusters
                .entry(wc.cluster.clone())
                .or_insert(wc.weight);
        }
        if let Some(principals) = principals {
            rule.allowed_services
                .get_or_insert_with(Allowed::default)
                .extend(principals);
        }
        if rule.rate_limit.is_none() {
            rule.rate_limit = rate_limit;
        }
    }

    pub fn add_hostnames<'h>(&mut self, hostnames: impl IntoIterator<Item = &'h String>) {
        for host in hostnames {
            if !self.hostnames.contains(host) {
                self.hostnames.push(host.clone());
            }
        }
    }
}

// === impl HttpRouteRule ===

impl HttpRouteRule {
    fn new(http_match: &HttpMatch) -> Self {
        Self {
            path: http_match.path.clone(),
            path_kind: http_match.path_kind,
            headers: http_match.headers.clone(),
            methods: http_match.methods.iter().collect(),
            target_clusters: WeightedClusters::new(),
            allowed_services: None,
            rate_limit: None,
            key: http_match.clone(),
        }
    }

    pub fn http_match(&self) -> &HttpMatch {
        &self.key
    }

    pub fn is_wildcard_path(&self) -> bool {
        self.key.is_wildcard_path()
    }
}
