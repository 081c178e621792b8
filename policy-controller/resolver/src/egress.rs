use crate::Resolver;
use ahash::AHashSet as HashSet;
use mesh_policy_controller_core::{
    egress::{
        Egress, EgressCluster, EgressGatewayPolicy, EgressRouteConfig, EgressTrafficMatch,
        EgressTrafficPolicy, ForwardMatch, ForwardPolicy, GatewayCluster, GatewayTarget,
        DEFAULT_FORWARD_RULE,
    },
    endpoint_key,
    http_route::HttpMatch,
    outbound::RouteMatchGroup,
    weight, NotReady, Protocol, Readiness, ServiceIdentity, WeightedCluster,
};

impl Resolver {
    /// Resolves the egress policy for an identity.
    ///
    /// HTTP destinations are routed by host. HTTPS destinations are matched
    /// by server name and TCP destinations by IP range.
    pub fn egress(&self, id: &ServiceIdentity) -> Readiness<EgressTrafficPolicy> {
        let egresses = self
            .directory
            .egress_policies(id)
            .ok_or_else(|| NotReady::new("egress policies not observed"))?;
        let gateway = self.directory.egress_gateway_policy();

        let mut policy = EgressTrafficPolicy::default();
        let mut seen_clusters = HashSet::new();
        for egress in &egresses {
            let forward_gateway = gateway
                .as_ref()
                .and_then(|g| g.rule_for(&egress.policy_ref()))
                .map(str::to_string);
            for port in &egress.ports {
                let clusters = match port.protocol {
                    Protocol::Http | Protocol::Grpc => {
                        self.egress_http(egress, port.number, &forward_gateway, &mut policy)
                    }
                    Protocol::Https => {
                        egress_https(egress, port.number, &forward_gateway, &mut policy)
                    }
                    Protocol::Tcp | Protocol::TcpServerFirst => {
                        egress_tcp(egress, port.number, port.protocol, &forward_gateway, &mut policy)
                    }
                };
                for cluster in clusters {
                    if seen_clusters.insert(cluster.name.clone()) {
                        policy.clusters.push(cluster);
                    }
                }
            }
        }

        Ok(policy)
    }

    fn egress_http(
        &self,
        egress: &Egress,
        port: u16,
        forward_gateway: &Option<String>,
        policy: &mut EgressTrafficPolicy,
    ) -> Vec<EgressCluster> {
        tracing::trace!(egress = %egress.name, port, "Resolving HTTP egress");
        let mut clusters = Vec::new();
        for host in &egress.hosts {
            let name = endpoint_key(host, port);
            policy.route_configs.push(EgressRouteConfig {
                port,
                host: host.clone(),
                hostnames: vec![host.clone(), name.clone()],
                routes: vec![RouteMatchGroup {
                    http_match: HttpMatch::wildcard(),
                    clusters: vec![WeightedCluster::new(&name, weight::ACCEPT_ALL)],
                }],
                forward_gateway: forward_gateway.clone(),
            });
            clusters.push(EgressCluster {
                address: Some(name.clone()),
                name,
            });
        }
        if !egress.hosts.is_empty() {
            policy.traffic_matches.push(EgressTrafficMatch {
                name: format!("egress_{}_{}", egress.name, port),
                port,
                protocol: Protocol::Http,
                destination_ranges: vec![],
                server_names: vec![],
                clusters: vec![],
                forward_gateway: forward_gateway.clone(),
            });
        }
        clusters
    }

    /// Resolves egress gateway forwarding.
    ///
    /// Each forwarding rule maps to the gateways that carry its traffic.
    /// Gateway endpoints must be known before the policy is usable.
    pub fn forward(&self) -> Readiness<ForwardPolicy> {
        let Some(EgressGatewayPolicy { global, rules }) = self.directory.egress_gateway_policy()
        else {
            return Ok(ForwardPolicy::default());
        };

        let mut named = Vec::new();
        if !global.is_empty() {
            named.push((DEFAULT_FORWARD_RULE.to_string(), global));
        }
        named.extend(rules.into_iter().map(|r| (r.name, r.gateways)));

        let mut policy = ForwardPolicy::default();
        let mut seen = HashSet::new();
        for (rule, targets) in named {
            policy.matches.push(ForwardMatch {
                rule,
                clusters: targets
                    .iter()
                    .map(|t| WeightedCluster::new(t.cluster_name(), t.weight))
                    .collect(),
            });
            for target in targets {
                if seen.insert(target.cluster_name()) {
                    policy.gateways.push(self.gateway_cluster(&target)?);
                }
            }
        }
        Ok(policy)
    }

    fn gateway_cluster(&self, target: &GatewayTarget) -> Readiness<GatewayCluster> {
        let endpoints = self
            .directory
            .endpoints(&target.service)
            .filter(|eps| !eps.is_empty())
            .ok_or_else(|| NotReady::new(format!("no endpoints for gateway {}", target.service)))?;

        // Gateways are dialed on the declared port, whatever the endpoint serves.
        let mut keyed = Vec::<(String, u32)>::new();
        for ep in endpoints {
            let key = endpoint_key(&ep.ip.to_string(), target.port);
            if keyed.iter().all(|(k, _)| *k != key) {
                let w = ep.cluster.map_or(weight::UNSET, |c| c.weight);
                keyed.push((key, w));
            }
        }

        Ok(GatewayCluster {
            name: target.cluster_name(),
            mode: target.mode,
            endpoints: keyed,
        })
    }
}

fn egress_https(
    egress: &Egress,
    port: u16,
    forward_gateway: &Option<String>,
    policy: &mut EgressTrafficPolicy,
) -> Vec<EgressCluster> {
    let mut clusters = Vec::new();
    if !egress.hosts.is_empty() {
        let weighted = egress
            .hosts
            .iter()
            .map(|h| WeightedCluster::new(endpoint_key(h, port), weight::ACCEPT_ALL))
            .collect::<Vec<_>>();
        clusters.extend(weighted.iter().map(|wc| EgressCluster {
            name: wc.cluster.clone(),
            address: Some(wc.cluster.clone()),
        }));
        policy.traffic_matches.push(EgressTrafficMatch {
            name: format!("egress_{}_{}_sni", egress.name, port),
            port,
            protocol: Protocol::Https,
            destination_ranges: vec![],
            server_names: egress.hosts.clone(),
            clusters: weighted,
            forward_gateway: forward_gateway.clone(),
        });
    }
    clusters.extend(egress_tcp(
        egress,
        port,
        Protocol::Https,
        forward_gateway,
        policy,
    ));
    clusters
}

/// Matches egress traffic by destination range. The proxy connects to the
/// original destination.
fn egress_tcp(
    egress: &Egress,
    port: u16,
    protocol: Protocol,
    forward_gateway: &Option<String>,
    policy: &mut EgressTrafficPolicy,
) -> Vec<EgressCluster> {
    if egress.ip_addresses.is_empty() {
        if protocol.is_tcp() && !egress.hosts.is_empty() {
            tracing::debug!(egress = %egress.name, port, "TCP egress cannot be matched by host");
        }
        return vec![];
    }

    let name = format!("egress_{}_{}_{}", egress.name, port, protocol.as_match_str());
    policy.traffic_matches.push(EgressTrafficMatch {
        name: name.clone(),
        port,
        protocol,
        destination_ranges: egress.ip_addresses.clone(),
        server_names: vec![],
        clusters: vec![WeightedCluster::new(&name, weight::ACCEPT_ALL)],
        forward_gateway: forward_gateway.clone(),
    });
    vec![EgressCluster {
        name,
        address: None,
    }]
}

#[cfg(test)]
mod tests;
