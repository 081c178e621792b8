use crate::{ClusterConfig, ProxyConfigSnapshot};
use mesh_policy_controller_core::{weight, LbType};
use std::collections::BTreeMap;

impl ProxyConfigSnapshot {
    /// Assigns weights to endpoints and gateway clusters that were left
    /// unset by policy.
    pub fn rebalance(&mut self) {
        for (name, config) in self.outbound.clusters_configs.iter_mut() {
            tracing::trace!(cluster = %name, "Rebalancing");
            rebalance_cluster(config);
        }

        for clusters in self.forward.forward_matches.values_mut() {
            for w in clusters.values_mut() {
                if *w == weight::UNSET {
                    *w = weight::ACCEPT_ALL;
                }
            }
        }

        for gateway in self.forward.egress_gateways.values_mut() {
            rebalance_gateway(&mut gateway.endpoints);
        }
    }
}

// Local endpoints take priority over failover endpoints; failover endpoints
// only accept traffic when no local endpoint exists.
fn rebalance_cluster(config: &mut ClusterConfig) {
    let has_local = config.endpoints.values().any(|ep| ep.cluster.is_none());
    for ep in config.endpoints.values_mut() {
        match ep.lb_type {
            Some(LbType::FailOver) => {
                ep.weight = if has_local {
                    weight::FAILOVER
                } else {
                    weight::ACCEPT_ALL
                };
            }
            Some(LbType::ActiveActive) | None if ep.weight == weight::UNSET => {
                ep.weight = weight::ACCEPT_ALL;
            }
            _ => {}
        }
    }
}

// Unweighted gateway endpoints share whatever weight the weighted ones
// leave unallocated.
fn rebalance_gateway(endpoints: &mut BTreeMap<String, u32>) {
    let unweighted = endpoints
        .iter()
        .filter(|(_, w)| **w == weight::UNSET)
        .map(|(k, _)| k.clone())
        .collect::<Vec<_>>();
    if unweighted.is_empty() {
        return;
    }
    let allocated = endpoints.values().fold(0u32, |sum, w| sum.saturating_add(*w));
    let unallocated = weight::ACCEPT_ALL.saturating_sub(allocated);
    let shares = weight::distribute(unallocated, unweighted.len());
    for (key, share) in unweighted.into_iter().zip(shares) {
        endpoints.insert(key, share);
    }
}
