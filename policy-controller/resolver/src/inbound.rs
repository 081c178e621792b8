use crate::Resolver;
use mesh_policy_controller_core::{
    access::SourcePolicy,
    http_route::HttpMatch,
    inbound::{
        InboundPolicy, InboundRouteConfig, InboundRouteRule, InboundTrafficMatch, LocalCluster,
        SourceRange,
    },
    mesh_config::MeshConfig,
    upstream::{HttpRateLimit, UpstreamTrafficSetting},
    weight, MeshService, ServiceIdentity, WeightedCluster, WILDCARD,
};
use std::collections::BTreeMap;

impl Resolver {
    /// Resolves mesh inbound policy for the services a proxy with identity
    /// `id` fronts.
    pub fn inbound(
        &self,
        mesh: &MeshConfig,
        id: &ServiceIdentity,
        services: &[MeshService],
    ) -> InboundPolicy {
        let mut policy = InboundPolicy::default();

        // Matches and principals granted by access rules, shared by every
        // fronted service.
        let grants: Vec<(Vec<HttpMatch>, Vec<String>)> = if mesh.permissive_traffic_policy_mode {
            vec![(vec![HttpMatch::wildcard()], vec![WILDCARD.to_string()])]
        } else {
            self.directory
                .access_rules(id)
                .into_iter()
                .filter(|rule| rule.destination == *id)
                .map(|rule| {
                    let matches = if rule.rules.is_empty() {
                        vec![HttpMatch::wildcard()]
                    } else {
                        self.route_group_matches(&rule.namespace, &rule.rules)
                    };
                    let principals = rule
                        .sources
                        .iter()
                        .map(|src| src.common_name(&self.cluster_info.trust_domain))
                        .collect::<Vec<_>>();
                    (matches, principals)
                })
                .collect()
        };

        for svc in services {
            let local = self.local_cluster(svc);
            let setting = self.directory.upstream_traffic_setting(&svc.service_ref());
            let plugins = self
                .directory
                .plugin_service(&svc.service_ref())
                .map(|ps| ps.inbound.plugins)
                .unwrap_or_default();

            policy.traffic_matches.push(InboundTrafficMatch {
                name: svc.traffic_match_name("inbound"),
                port: local.port,
                protocol: svc.protocol,
                sources: vec![],
                clusters: vec![WeightedCluster::new(&local.name, weight::ACCEPT_ALL)],
                rate_limit: setting
                    .as_ref()
                    .and_then(|s| s.rate_limit.as_ref())
                    .and_then(|rl| rl.tcp.clone()),
                plugins,
            });

            if !svc.protocol.is_tcp() {
                let mut rules = Vec::new();
                for (matches, principals) in &grants {
                    for m in matches {
                        rules.push(InboundRouteRule {
                            http_match: m.clone(),
                            clusters: vec![WeightedCluster::new(&local.name, weight::ACCEPT_ALL)],
                            allowed_principals: principals.clone(),
                            rate_limit: route_rate_limit(setting.as_ref(), m),
                        });
                    }
                }
                policy
                    .route_configs
                    .push(self.inbound_route_config(svc, vec![], rules, setting.as_ref()));
            }

            policy.clusters.push(local);
        }

        policy
    }

    /// Resolves the ingress, access-control and export policies fronting a
    /// service. Each admits traffic by source network rather than by
    /// identity.
    pub fn inbound_sources(&self, svc: &MeshService) -> InboundPolicy {
        let mut policy = InboundPolicy::default();
        let local = self.local_cluster(svc);
        let setting = self.directory.upstream_traffic_setting(&svc.service_ref());

        let sources = self
            .directory
            .source_policies(&svc.service_ref())
            .into_iter()
            .filter(|p| p.port == local.port);
        for source in sources {
            let SourcePolicy {
                kind,
                name,
                protocol,
                sources,
                tls,
                paths,
                ..
            } = source;
            tracing::trace!(service = %svc, ?kind, %name, "Applying source policy");

            let ranges = sources
                .into_iter()
                .map(|net| SourceRange {
                    net,
                    tls: tls.clone(),
                })
                .collect::<Vec<_>>();

            policy.traffic_matches.push(InboundTrafficMatch {
                name: format!("{}_{}", svc.traffic_match_name("inbound"), name),
                port: local.port,
                protocol,
                sources: ranges.clone(),
                clusters: vec![WeightedCluster::new(&local.name, weight::ACCEPT_ALL)],
                rate_limit: None,
                plugins: vec![],
            });

            if protocol.is_tcp() {
                continue;
            }

            let matches = if paths.is_empty() {
                vec![HttpMatch::wildcard()]
            } else {
                paths
                    .into_iter()
                    .map(|path| HttpMatch::regex(path, vec![], BTreeMap::new()))
                    .collect()
            };
            let rules = matches
                .into_iter()
                .map(|m| InboundRouteRule {
                    rate_limit: route_rate_limit(setting.as_ref(), &m),
                    http_match: m,
                    clusters: vec![WeightedCluster::new(&local.name, weight::ACCEPT_ALL)],
                    allowed_principals: vec![WILDCARD.to_string()],
                })
                .collect();
            policy
                .route_configs
                .push(self.inbound_route_config(svc, ranges, rules, setting.as_ref()));
        }

        if !policy.traffic_matches.is_empty() {
            policy.clusters.push(local);
        }
        policy
    }

    fn local_cluster(&self, svc: &MeshService) -> LocalCluster {
        LocalCluster {
            name: svc.local_cluster_name(),
            port: svc.target_port(),
        }
    }

    fn inbound_route_config(
        &self,
        svc: &MeshService,
        sources: Vec<SourceRange>,
        rules: Vec<InboundRouteRule>,
        setting: Option<&UpstreamTrafficSetting>,
    ) -> InboundRouteConfig {
        let rate_limit = setting.and_then(|s| s.rate_limit.as_ref());
        InboundRouteConfig {
            port: svc.target_port(),
            sources,
            name: svc.fqdn(&self.cluster_info.cluster_domain),
            hostnames: svc.hostnames(&self.cluster_info.cluster_domain, true),
            rules,
            rate_limit: rate_limit.and_then(|rl| rl.http.clone()),
            header_rate_limits: rate_limit
                .map(|rl| rl.http_headers.clone())
                .unwrap_or_default(),
        }
    }
}

fn route_rate_limit(
    setting: Option<&UpstreamTrafficSetting>,
    m: &HttpMatch,
) -> Option<HttpRateLimit> {
    setting?
        .http_routes
        .iter()
        .find(|r| r.path == m.path)
        .map(|r| r.rate_limit.clone())
}
