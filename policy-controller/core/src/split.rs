use serde::Deserialize;
use std::collections::BTreeMap;

/// Distributes traffic addressed to an apex service across weighted backend
/// services in the same namespace.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSplit {
    pub name: String,
    pub namespace: String,
    pub apex: String,

    /// Restricts the split to requests selected by these route groups. An
    /// empty list applies the split to all traffic.
    #[serde(default)]
    pub matches: Vec<RouteGroupRef>,

    pub backends: Vec<SplitBackend>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SplitBackend {
    pub service: String,
    pub weight: u32,
}

/// References an [`HttpRouteGroup`] by name, optionally narrowed to some of
/// its named matches.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RouteGroupRef {
    pub name: String,
    #[serde(default)]
    pub matches: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HttpRouteGroup {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub matches: Vec<HttpRouteGroupMatch>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteGroupMatch {
    pub name: String,
    #[serde(default)]
    pub path_regex: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}
