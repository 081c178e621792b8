//! Merges resolved policy into a snapshot.
//!
//! Entries describing the same traffic are merged rather than duplicated:
//! traffic matches by port and name (or source ranges inbound), route rules
//! by structural equality of their request match.

use crate::{
    document::{
        ClusterConfig, EgressClusterConfig, EgressTrafficMatch, GatewayConfig,
        InboundTrafficMatch, LocalClusterConfig, OutboundTrafficMatch, WeightedEndpoint,
    },
    ProxyConfigSnapshot,
};
use mesh_policy_controller_core::{
    access::SourceTls,
    egress::{EgressTrafficPolicy, ForwardPolicy},
    endpoint_key,
    inbound::{InboundPolicy, SourceRange},
    outbound::{self, OutboundPolicy},
    plugin::PluginConfig,
    weight, IpNet, WeightedCluster,
};
use std::collections::{BTreeMap, BTreeSet};

impl ProxyConfigSnapshot {
    pub fn merge_inbound(&mut self, policy: InboundPolicy) {
        let inbound = &mut self.inbound;
        for tm in policy.traffic_matches {
            let sources = source_ranges(&tm.sources);
            let matches = inbound.traffic_matches.entry(tm.port).or_default();
            let entry = match matches.iter().position(|m| m.source_ip_ranges == sources) {
                Some(idx) => &mut matches[idx],
                None => {
                    matches.push(InboundTrafficMatch {
                        port: tm.port,
                        protocol: tm.protocol,
                        source_ip_ranges: sources,
                        target_clusters: Default::default(),
                        http_service_route_rules: Default::default(),
                        rate_limit: None,
                        plugins: vec![],
                    });
                    let last = matches.len() - 1;
                    &mut matches[last]
                }
            };
            merge_clusters(&mut entry.target_clusters, &tm.clusters);
            merge_plugins(&mut entry.plugins, tm.plugins);
            if entry.rate_limit.is_none() {
                entry.rate_limit = tm.rate_limit;
            }
        }

        for rc in policy.route_configs {
            let sources = source_ranges(&rc.sources);
            let Some(entry) = inbound
                .traffic_matches
                .get_mut(&rc.port)
                .and_then(|ms| ms.iter_mut().find(|m| m.source_ip_ranges == sources))
            else {
                tracing::debug!(port = rc.port, name = %rc.name, "No inbound traffic match for routes");
                continue;
            };
            let set = entry.http_service_route_rules.entry(rc.name).or_default();
            set.add_hostnames(&rc.hostnames);
            if set.rate_limit.is_none() {
                set.rate_limit = rc.rate_limit;
            }
            for hrl in rc.header_rate_limits {
                if !set.header_rate_limits.contains(&hrl) {
                    set.header_rate_limits.push(hrl);
                }
            }
            for rule in rc.rules {
                set.merge_route(
                    &rule.http_match,
                    &rule.clusters,
                    Some(&rule.allowed_principals),
                    rule.rate_limit,
                );
            }
        }

        for cluster in policy.clusters {
            let config = inbound
                .clusters_configs
                .entry(cluster.name)
                .or_insert_with(LocalClusterConfig::default);
            config
                .endpoints
                .insert(format!("127.0.0.1:{}", cluster.port), weight::ACCEPT_ALL);
        }
    }

    /// Merges outbound policy. The policy's cluster references are resolved
    /// separately and merged with [`Self::merge_outbound_clusters`].
    pub fn merge_outbound(&mut self, policy: OutboundPolicy) {
        let outbound = &mut self.outbound;
        for tm in policy.traffic_matches {
            let port = tm.service.port;
            let matches = outbound.traffic_matches.entry(port).or_default();
            let entry = match matches.iter().position(|m| m.name == tm.name) {
                Some(idx) => &mut matches[idx],
                None => {
                    matches.push(OutboundTrafficMatch {
                        name: tm.name.clone(),
                        port,
                        protocol: tm.service.protocol,
                        destination_ip_ranges: vec![],
                        target_clusters: Default::default(),
                        http_service_route_rules: Default::default(),
                        plugins: vec![],
                        allowed_egress_traffic: false,
                    });
                    let last = matches.len() - 1;
                    &mut matches[last]
                }
            };
            merge_ranges(&mut entry.destination_ip_ranges, &tm.destination_ranges);
            merge_clusters(&mut entry.target_clusters, &tm.clusters);
            merge_plugins(&mut entry.plugins, tm.plugins);
            entry.allowed_egress_traffic |= tm.egress;
        }

        for rc in policy.route_configs {
            let name = rc.service.traffic_match_name("outbound");
            let Some(entry) = outbound
                .traffic_matches
                .get_mut(&rc.service.port)
                .and_then(|ms| ms.iter_mut().find(|m| m.name == name))
            else {
                tracing::debug!(service = %rc.service, "No outbound traffic match for routes");
                continue;
            };
            let set = entry.http_service_route_rules.entry(rc.name).or_default();
            set.add_hostnames(&rc.hostnames);
            if set.retry_policy.is_none() {
                set.retry_policy = rc.retry_policy;
            }
            for route in rc.routes {
                set.merge_route(&route.http_match, &route.clusters, None, None);
            }
        }

        for (host, ips) in policy.dns_resolvable {
            let entry = self.dns_resolve_db.entry(host).or_default();
            for ip in ips {
                if !entry.contains(&ip) {
                    entry.push(ip);
                }
            }
        }
    }

    /// Records the endpoints of outbound clusters. Endpoint weights come
    /// from their multi-cluster tag and are left unset otherwise.
    pub fn merge_outbound_clusters(&mut self, clusters: Vec<outbound::ClusterConfig>) {
        for cluster in clusters {
            let config = self
                .outbound
                .clusters_configs
                .entry(cluster.name)
                .or_insert_with(ClusterConfig::default);
            for ep in cluster.endpoints {
                let key = endpoint_key(&ep.ip.to_string(), ep.port);
                let endpoint = match ep.cluster {
                    Some(tag) => WeightedEndpoint {
                        weight: tag.weight,
                        cluster: Some(tag.cluster),
                        lb_type: Some(tag.lb_type),
                    },
                    None => WeightedEndpoint {
                        weight: weight::UNSET,
                        cluster: None,
                        lb_type: None,
                    },
                };
                config.endpoints.entry(key).or_insert(endpoint);
            }
            if config.connection_settings.is_none() {
                config.connection_settings = cluster.connection_settings;
            }
            if config.retry_policy.is_none() {
                config.retry_policy = cluster.retry_policy;
            }
            config.active_health_check |= cluster.active_health_checks;
        }
    }

    pub fn merge_egress(&mut self, policy: EgressTrafficPolicy) {
        let egress = &mut self.egress;
        for tm in policy.traffic_matches {
            let matches = egress.traffic_matches.entry(tm.port).or_default();
            let server_names = tm.server_names.iter().cloned().collect::<BTreeSet<_>>();
            let existing = matches.iter().position(|m| {
                m.protocol == tm.protocol
                    && m.destination_ip_ranges == tm.destination_ranges
                    && m.server_names == server_names
            });
            let entry = match existing {
                Some(idx) => &mut matches[idx],
                None => {
                    matches.push(EgressTrafficMatch {
                        name: tm.name.clone(),
                        port: tm.port,
                        protocol: tm.protocol,
                        destination_ip_ranges: tm.destination_ranges.clone(),
                        server_names,
                        target_clusters: Default::default(),
                        http_service_route_rules: Default::default(),
                        egress_forward_gateway: None,
                    });
                    let last = matches.len() - 1;
                    &mut matches[last]
                }
            };
            merge_clusters(&mut entry.target_clusters, &tm.clusters);
            if entry.egress_forward_gateway.is_none() {
                entry.egress_forward_gateway = tm.forward_gateway;
            }
        }

        for rc in policy.route_configs {
            let Some(entry) = egress
                .traffic_matches
                .get_mut(&rc.port)
                .and_then(|ms| ms.iter_mut().find(|m| m.is_host_routed()))
            else {
                tracing::debug!(port = rc.port, host = %rc.host, "No egress traffic match for routes");
                continue;
            };
            let set = entry.http_service_route_rules.entry(rc.host).or_default();
            set.add_hostnames(&rc.hostnames);
            if set.egress_forward_gateway.is_none() {
                set.egress_forward_gateway = rc.forward_gateway;
            }
            for route in rc.routes {
                set.merge_route(&route.http_match, &route.clusters, None, None);
            }
        }

        for cluster in policy.clusters {
            let config = egress
                .clusters_configs
                .entry(cluster.name)
                .or_insert_with(EgressClusterConfig::default);
            if let Some(address) = cluster.address {
                config.endpoints.insert(address, weight::ACCEPT_ALL);
            }
        }
    }

    pub fn merge_forward(&mut self, policy: ForwardPolicy) {
        let forward = &mut self.forward;
        for fm in policy.matches {
            let clusters = forward.forward_matches.entry(fm.rule).or_default();
            merge_clusters(clusters, &fm.clusters);
        }
        for gw in policy.gateways {
            let config = forward
                .egress_gateways
                .entry(gw.name)
                .or_insert_with(|| GatewayConfig {
                    mode: gw.mode,
                    endpoints: BTreeMap::new(),
                });
            for (key, w) in gw.endpoints {
                config.endpoints.entry(key).or_insert(w);
            }
        }
    }
}

fn source_ranges(sources: &[SourceRange]) -> BTreeMap<String, Option<SourceTls>> {
    sources
        .iter()
        .map(|s| (s.net.to_string(), s.tls.clone()))
        .collect()
}

fn merge_clusters(target: &mut BTreeMap<String, u32>, clusters: &[WeightedCluster]) {
    for wc in clusters {
        target.entry(wc.cluster.clone()).or_insert(wc.weight);
    }
}

fn merge_ranges(target: &mut Vec<IpNet>, ranges: &[IpNet]) {
    for net in ranges {
        if !target.contains(net) {
            target.push(*net);
        }
    }
}

fn merge_plugins(target: &mut Vec<PluginConfig>, plugins: Vec<PluginConfig>) {
    for plugin in plugins {
        if !target.iter().any(|p| p.name == plugin.name) {
            target.push(plugin);
        }
    }
}

#[cfg(test)]
mod tests;
