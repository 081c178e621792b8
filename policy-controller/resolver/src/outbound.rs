use crate::Resolver;
use ahash::AHashSet as HashSet;
use mesh_policy_controller_core::{
    egress::Egress,
    http_route::HttpMatch,
    mesh_config::MeshConfig,
    outbound::{OutboundPolicy, OutboundRouteConfig, OutboundTrafficMatch, RouteMatchGroup},
    plugin::{PluginConfig, PluginService},
    split::{SplitBackend, TrafficSplit},
    weight, ClusterRef, IpNet, LbType, MeshService, ServiceIdentity, ServiceRef, WeightedCluster,
};
use std::net::IpAddr;

/// The route matches and clusters contributed by one traffic split, or by
/// the service itself when it is not split.
#[derive(Debug)]
struct SplitGroup {
    /// `None` when the group applies to all of the service's traffic.
    matches: Option<Vec<HttpMatch>>,
    clusters: Vec<(ClusterRef, u32)>,
}

impl Resolver {
    /// Resolves the outbound policy for a proxy with identity `id` fronting
    /// `downstream` services.
    pub fn outbound(
        &self,
        mesh: &MeshConfig,
        id: &ServiceIdentity,
        downstream: &[MeshService],
    ) -> OutboundPolicy {
        let mut policy = OutboundPolicy::default();
        let mut seen_clusters = HashSet::new();

        let plugin_services = downstream
            .iter()
            .filter_map(|svc| self.directory.plugin_service(&svc.service_ref()))
            .collect::<Vec<_>>();
        let mut egresses: Option<Vec<Egress>> = None;

        for svc in self.outbound_services(mesh, id) {
            let egress = mesh.enable_egress || {
                let egresses = egresses
                    .get_or_insert_with(|| self.directory.egress_policies(id).unwrap_or_default());
                self.is_egress_service(&svc, egresses)
            };

            let endpoints = self
                .directory
                .endpoints(&svc.service_ref())
                .unwrap_or_default();
            let monitored = self
                .directory
                .namespace(&svc.namespace)
                .map_or(false, |ns| ns.monitored);

            let mut destination_ranges = Vec::<IpNet>::new();
            for ep in &endpoints {
                let net = IpNet::from(ep.ip);
                if !destination_ranges.contains(&net) {
                    destination_ranges.push(net);
                }
            }

            // Services without local endpoints in the mesh must be resolved
            // by the proxy itself.
            let intra_cluster = endpoints
                .iter()
                .any(|ep| ep.is_local() && (monitored || egress));
            if !intra_cluster {
                let mut ips = Vec::<IpAddr>::new();
                for ep in &endpoints {
                    if !ips.contains(&ep.ip) {
                        ips.push(ep.ip);
                    }
                }
                if !ips.is_empty() {
                    policy
                        .dns_resolvable
                        .insert(svc.fqdn(&self.cluster_info.cluster_domain), ips);
                }
            }

            let splits = self.directory.splits_for(&svc.service_ref());
            let groups = if splits.is_empty() {
                vec![SplitGroup {
                    matches: None,
                    clusters: self.service_clusters(&svc),
                }]
            } else {
                splits
                    .iter()
                    .map(|split| self.split_group(&svc, split))
                    .collect()
            };
            let fallback = fallback_clusters(&groups);
            if fallback.is_empty() {
                tracing::debug!(%id, service = %svc, "No upstream clusters resolved; skipping");
                continue;
            }

            let service_cluster = svc.cluster();
            let referenced = std::iter::once(&service_cluster)
                .chain(groups.iter().flat_map(|g| g.clusters.iter().map(|(c, _)| c)));
            for cluster in referenced {
                if seen_clusters.insert(cluster.clone()) {
                    policy.clusters.push(cluster.clone());
                }
            }

            policy.traffic_matches.push(OutboundTrafficMatch {
                name: svc.traffic_match_name("outbound"),
                service: svc.clone(),
                destination_ranges,
                clusters: fallback.clone(),
                plugins: outbound_plugins(&plugin_services, &svc),
                egress,
            });

            if svc.protocol.is_tcp() {
                continue;
            }

            let mut routes = Vec::new();
            for group in &groups {
                let clusters = weighted(&group.clusters);
                for m in group.matches.iter().flatten() {
                    routes.push(RouteMatchGroup {
                        http_match: m.clone(),
                        clusters: clusters.clone(),
                    });
                }
            }
            if !routes.iter().any(|r| r.http_match.is_wildcard_path()) {
                routes.push(RouteMatchGroup {
                    http_match: HttpMatch::wildcard(),
                    clusters: fallback,
                });
            }

            policy.route_configs.push(OutboundRouteConfig {
                name: svc.fqdn(&self.cluster_info.cluster_domain),
                hostnames: svc.hostnames(
                    &self.cluster_info.cluster_domain,
                    svc.namespace == id.namespace,
                ),
                retry_policy: self.directory.retry_policy(id, &svc.service_ref()),
                routes,
                service: svc,
            });
        }

        policy
    }

    /// Lists the upstream services an identity may reach.
    ///
    /// In permissive mode this is every service in the mesh. Otherwise it is
    /// every service backed by a destination of an access rule naming the
    /// identity as a source.
    fn outbound_services(&self, mesh: &MeshConfig, id: &ServiceIdentity) -> Vec<MeshService> {
        if mesh.permissive_traffic_policy_mode {
            return self.directory.services();
        }

        let mut destinations = Vec::new();
        for rule in self.directory.access_rules(id) {
            if rule.allows_source(id) && !destinations.contains(&rule.destination) {
                destinations.push(rule.destination);
            }
        }

        let mut services = Vec::new();
        for dst in &destinations {
            for svc in self.directory.services_for_identity(dst) {
                if !services.contains(&svc) {
                    services.push(svc);
                }
            }
        }
        services
    }

    fn is_egress_service(&self, svc: &MeshService, egresses: &[Egress]) -> bool {
        let hostnames = svc.hostnames(&self.cluster_info.cluster_domain, true);
        egresses
            .iter()
            .flat_map(|e| e.hosts.iter())
            .any(|host| hostnames.contains(host))
    }

    fn split_group(&self, apex: &MeshService, split: &TrafficSplit) -> SplitGroup {
        let matches = if split.matches.is_empty() {
            None
        } else {
            Some(self.route_group_matches(&split.namespace, &split.matches))
        };
        let clusters = split
            .backends
            .iter()
            .flat_map(|backend| self.backend_clusters(apex, backend))
            .collect();
        SplitGroup { matches, clusters }
    }

    /// Resolves a split backend to its local cluster and any multi-cluster
    /// clusters serving the apex port.
    ///
    /// Active clusters share the backend's weight; failover clusters receive
    /// the failover weight.
    fn backend_clusters(
        &self,
        apex: &MeshService,
        backend: &SplitBackend,
    ) -> Vec<(ClusterRef, u32)> {
        let service = ServiceRef::new(&apex.namespace, &backend.service);

        let mut active = Vec::new();
        let mut failover = Vec::new();
        if let Some(target_port) = self.directory.target_port(&service, apex.port) {
            active.push(ClusterRef {
                service: service.clone(),
                target_port,
            });
        }
        let local = active.clone();

        let remote = self.directory.multicluster_target_ports(&service, apex.port);
        for (target_port, lb_type) in remote {
            let cluster = ClusterRef {
                service: service.clone(),
                target_port,
            };
            if local.contains(&cluster) {
                continue;
            }
            match lb_type {
                LbType::ActiveActive => active.push(cluster),
                LbType::FailOver => failover.push(cluster),
            }
        }

        if active.is_empty() && failover.is_empty() {
            tracing::debug!(apex = %apex, backend = %service, "Split backend has no clusters");
        }

        let weights = weight::distribute(backend.weight, active.len());
        active
            .into_iter()
            .zip(weights)
            .chain(failover.into_iter().map(|c| (c, weight::FAILOVER)))
            .collect()
    }

    /// The cluster of a service that is not split.
    fn service_clusters(&self, svc: &MeshService) -> Vec<(ClusterRef, u32)> {
        let w = match self.directory.multicluster_lb(svc) {
            Some((LbType::ActiveActive, w)) if w > 0 => w,
            Some((LbType::FailOver, _)) => weight::FAILOVER,
            _ => weight::ACCEPT_ALL,
        };
        vec![(svc.cluster(), w)]
    }
}

/// Picks the clusters for traffic no explicit route match selects.
///
/// When some group applies to all traffic, its clusters are used with their
/// weights. Otherwise every cluster of every group accepts traffic equally.
/// Clusters are deduplicated by name.
fn fallback_clusters(groups: &[SplitGroup]) -> Vec<WeightedCluster> {
    let has_wildcard = groups.iter().any(|g| g.matches.is_none());
    let mut seen = HashSet::new();
    let mut clusters = Vec::new();
    for group in groups {
        if has_wildcard && group.matches.is_some() {
            continue;
        }
        for (cluster, w) in &group.clusters {
            let name = cluster.name();
            if seen.insert(name.clone()) {
                let w = if has_wildcard { *w } else { weight::ACCEPT_ALL };
                clusters.push(WeightedCluster::new(name, w));
            }
        }
    }
    clusters
}

fn weighted(clusters: &[(ClusterRef, u32)]) -> Vec<WeightedCluster> {
    clusters
        .iter()
        .map(|(c, w)| WeightedCluster::new(c.name(), *w))
        .collect()
}

fn outbound_plugins(plugin_services: &[PluginService], svc: &MeshService) -> Vec<PluginConfig> {
    let target = svc.service_ref();
    plugin_services
        .iter()
        .flat_map(|ps| ps.outbound_plugins_for(&target).cloned().collect::<Vec<_>>())
        .collect()
}

#[cfg(test)]
mod tests;
