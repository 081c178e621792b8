//! Resolves declared mesh resources into per-identity traffic policy.
//!
//! The resolver reads from a [`ResourceDirectory`] and never mutates it.
//! Lookups that depend on data the directory has not observed yet report
//! [`NotReady`](mesh_policy_controller_core::NotReady) so that the caller
//! can retry the whole computation later.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod clusters;
mod egress;
mod inbound;
mod outbound;
mod route_groups;

#[cfg(test)]
mod tests;

use mesh_policy_controller_core::ResourceDirectory;
use std::sync::Arc;

/// Holds cluster-wide configuration required by the resolver.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// The DNS suffix of in-cluster services.
    pub cluster_domain: String,

    /// The trust domain of proxy certificates.
    pub trust_domain: String,
}

#[derive(Clone)]
pub struct Resolver {
    directory: Arc<dyn ResourceDirectory>,
    cluster_info: Arc<ClusterInfo>,
}

// === impl Resolver ===

impl Resolver {
    pub fn new(directory: Arc<dyn ResourceDirectory>, cluster_info: Arc<ClusterInfo>) -> Self {
        Self {
            directory,
            cluster_info,
        }
    }

    pub fn cluster_info(&self) -> &ClusterInfo {
        &self.cluster_info
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("cluster_info", &self.cluster_info)
            .finish_non_exhaustive()
    }
}
