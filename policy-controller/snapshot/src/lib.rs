//! The compiled per-proxy configuration document.
//!
//! A [`ProxyConfigSnapshot`] is assembled by merging resolved policy into
//! it. It is then ordered, rebalanced and fingerprinted before it is
//! published. Every collection in the document is ordered so that
//! serializing the same policy always yields the same bytes.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod aggregate;
mod balance;
mod document;
mod endpoints;
mod fingerprint;
mod order;
mod route;

pub use self::{
    document::{
        CertificateBlock, ClusterConfig, EgressClusterConfig, EgressConfig, EgressTrafficMatch,
        ForwardConfig, GatewayConfig, InboundConfig, InboundTrafficMatch, LocalClusterConfig,
        OutboundConfig, OutboundTrafficMatch, ProxyConfigSnapshot, Spec, TrafficSpec,
        WeightedClusters, WeightedEndpoint,
    },
    endpoints::INGRESS_CONTROLLER,
    fingerprint::{plugin_set_version, Fingerprint},
    order::by_specificity,
    route::{Allowed, HttpRouteRule, HttpRouteRuleSet},
};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}
