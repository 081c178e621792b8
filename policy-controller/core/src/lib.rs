#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod access;
pub mod certificate;
pub mod directory;
pub mod egress;
pub mod http_route;
mod identity;
pub mod inbound;
pub mod memory;
pub mod mesh_config;
pub mod outbound;
pub mod plugin;
pub mod proxy;
mod readiness;
mod service;
pub mod split;
pub mod store;
pub mod upstream;
pub mod weight;

pub use self::{
    directory::{Namespace, ResourceDirectory},
    identity::{InvalidIdentity, ServiceIdentity},
    readiness::{NotReady, Readiness},
    service::{
        endpoint_key, ClusterRef, ClusterTag, Endpoint, LbType, MeshService, Protocol, ServiceRef,
    },
    weight::WeightedCluster,
};
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};

/// Matches any method, service or principal.
pub const WILDCARD: &str = "*";
