use crate::{ProxyConfigSnapshot, WeightedEndpoint};
use maplit::btreemap;
use mesh_policy_controller_core::{
    egress::{
        EgressCluster, EgressRouteConfig, EgressTrafficMatch, EgressTrafficPolicy, ForwardMatch,
        ForwardPolicy, GatewayCluster, GatewayMode,
    },
    http_route::HttpMatch,
    inbound::{
        InboundPolicy, InboundRouteConfig, InboundRouteRule, InboundTrafficMatch, LocalCluster,
        SourceRange,
    },
    outbound::{
        self, OutboundPolicy, OutboundRouteConfig, OutboundTrafficMatch, RouteMatchGroup,
    },
    ClusterTag, Endpoint, LbType, MeshService, Protocol, WeightedCluster,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn svc(name: &str, port: u16) -> MeshService {
    MeshService {
        namespace: "ns".to_string(),
        name: name.to_string(),
        port,
        target_port: None,
        protocol: Protocol::Http,
    }
}

fn outbound_policy(
    svc: &MeshService,
    clusters: Vec<WeightedCluster>,
    routes: Vec<RouteMatchGroup>,
) -> OutboundPolicy {
    OutboundPolicy {
        traffic_matches: vec![OutboundTrafficMatch {
            name: svc.traffic_match_name("outbound"),
            service: svc.clone(),
            destination_ranges: vec!["10.0.1.1/32".parse().unwrap()],
            clusters,
            plugins: vec![],
            egress: false,
        }],
        route_configs: vec![OutboundRouteConfig {
            service: svc.clone(),
            name: svc.fqdn("cluster.local"),
            hostnames: svc.hostnames("cluster.local", true),
            routes,
            retry_policy: None,
        }],
        clusters: vec![svc.cluster()],
        dns_resolvable: Default::default(),
    }
}

#[test]
fn outbound_service_without_split() {
    let b = svc("b", 8080);
    let clusters = vec![WeightedCluster::new("ns/b|8080", 100)];
    let mut snapshot = ProxyConfigSnapshot::default();
    snapshot.merge_outbound(outbound_policy(
        &b,
        clusters.clone(),
        vec![RouteMatchGroup {
            http_match: HttpMatch::wildcard(),
            clusters,
        }],
    ));

    let matches = &snapshot.outbound.traffic_matches[&8080];
    assert_eq!(matches.len(), 1);
    assert_eq!(
        matches[0].target_clusters,
        btreemap! { "ns/b|8080".to_string() => 100 }
    );
    let rules = &matches[0].http_service_route_rules["b.ns.svc.cluster.local"].route_rules;
    assert_eq!(rules.len(), 1);
    assert!(rules[0].is_wildcard_path());
    assert_eq!(rules[0].target_clusters, btreemap! { "ns/b|8080".to_string() => 100 });
}

#[test]
fn repeated_outbound_policy_is_merged() {
    let b = svc("b", 8080);
    let api = HttpMatch::regex("/api", vec![], BTreeMap::new());
    let mut snapshot = ProxyConfigSnapshot::default();
    snapshot.merge_outbound(outbound_policy(
        &b,
        vec![WeightedCluster::new("ns/b-v1|8080", 100)],
        vec![RouteMatchGroup {
            http_match: api.clone(),
            clusters: vec![WeightedCluster::new("ns/b-v1|8080", 100)],
        }],
    ));
    snapshot.merge_outbound(outbound_policy(
        &b,
        vec![WeightedCluster::new("ns/b-v2|8080", 100)],
        vec![RouteMatchGroup {
            http_match: api,
            clusters: vec![WeightedCluster::new("ns/b-v2|8080", 100)],
        }],
    ));

    let matches = &snapshot.outbound.traffic_matches[&8080];
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].destination_ip_ranges.len(), 1);
    let rules = &matches[0].http_service_route_rules["b.ns.svc.cluster.local"].route_rules;
    assert_eq!(rules.len(), 1);
    assert_eq!(
        rules[0].target_clusters,
        btreemap! {
            "ns/b-v1|8080".to_string() => 100,
            "ns/b-v2|8080".to_string() => 100,
        }
    );
}

#[test]
fn outbound_cluster_endpoints_carry_tags() {
    let mut snapshot = ProxyConfigSnapshot::default();
    snapshot.merge_outbound_clusters(vec![outbound::ClusterConfig {
        name: "ns/b|8080".to_string(),
        endpoints: vec![
            Endpoint {
                ip: "10.0.1.1".parse().unwrap(),
                port: 8080,
                cluster: None,
            },
            Endpoint {
                ip: "fd00::1".parse().unwrap(),
                port: 8080,
                cluster: Some(ClusterTag {
                    cluster: "east".to_string(),
                    lb_type: LbType::FailOver,
                    weight: 0,
                }),
            },
        ],
        connection_settings: None,
        retry_policy: None,
        active_health_checks: true,
    }]);

    let config = &snapshot.outbound.clusters_configs["ns/b|8080"];
    assert!(config.active_health_check);
    assert_eq!(
        config.endpoints,
        btreemap! {
            "10.0.1.1:8080".to_string() => WeightedEndpoint { weight: 0, cluster: None, lb_type: None },
            "[fd00::1]:8080".to_string() => WeightedEndpoint {
                weight: 0,
                cluster: Some("east".to_string()),
                lb_type: Some(LbType::FailOver),
            },
        }
    );
}

#[test]
fn inbound_matches_are_keyed_by_sources() {
    let local = WeightedCluster::new("ns/b|8080|local", 100);
    let rule = |principal: &str| InboundRouteRule {
        http_match: HttpMatch::wildcard(),
        clusters: vec![local.clone()],
        allowed_principals: vec![principal.to_string()],
        rate_limit: None,
    };
    let edge = vec![SourceRange {
        net: "10.0.0.0/8".parse().unwrap(),
        tls: None,
    }];
    let tm = |sources: Vec<SourceRange>| InboundTrafficMatch {
        name: "inbound_ns/b_80_http".to_string(),
        port: 8080,
        protocol: Protocol::Http,
        sources,
        clusters: vec![local.clone()],
        rate_limit: None,
        plugins: vec![],
    };
    let rc = |sources: Vec<SourceRange>, principal: &str| InboundRouteConfig {
        port: 8080,
        sources,
        name: "b.ns.svc.cluster.local".to_string(),
        hostnames: vec![],
        rules: vec![rule(principal)],
        rate_limit: None,
        header_rate_limits: vec![],
    };

    let mut snapshot = ProxyConfigSnapshot::default();
    snapshot.merge_inbound(InboundPolicy {
        traffic_matches: vec![tm(vec![])],
        route_configs: vec![
            rc(vec![], "a.ns.cluster.local"),
            rc(vec![], "c.ns.cluster.local"),
        ],
        clusters: vec![LocalCluster {
            name: "ns/b|8080|local".to_string(),
            port: 8080,
        }],
    });
    snapshot.merge_inbound(InboundPolicy {
        traffic_matches: vec![tm(edge.clone())],
        route_configs: vec![rc(edge, "*")],
        clusters: vec![],
    });

    let matches = &snapshot.inbound.traffic_matches[&8080];
    assert_eq!(matches.len(), 2);

    let mesh = &matches[0].http_service_route_rules["b.ns.svc.cluster.local"].route_rules;
    assert_eq!(mesh.len(), 1);
    let principals = mesh[0].allowed_services.as_ref().unwrap();
    assert!(principals.contains("a.ns.cluster.local"));
    assert!(principals.contains("c.ns.cluster.local"));
    assert!(!principals.is_any());

    assert_eq!(
        matches[1].source_ip_ranges,
        btreemap! { "10.0.0.0/8".to_string() => None }
    );
    let ingress = &matches[1].http_service_route_rules["b.ns.svc.cluster.local"].route_rules;
    assert!(ingress[0].allowed_services.as_ref().unwrap().is_any());

    assert_eq!(
        snapshot.inbound.clusters_configs["ns/b|8080|local"].endpoints,
        btreemap! { "127.0.0.1:8080".to_string() => 100 }
    );
}

#[test]
fn egress_http_matches_share_a_port() {
    let host_match = |name: &str| EgressTrafficMatch {
        name: name.to_string(),
        port: 80,
        protocol: Protocol::Http,
        destination_ranges: vec![],
        server_names: vec![],
        clusters: vec![],
        forward_gateway: None,
    };
    let route = |host: &str| EgressRouteConfig {
        port: 80,
        host: host.to_string(),
        hostnames: vec![host.to_string()],
        routes: vec![RouteMatchGroup {
            http_match: HttpMatch::wildcard(),
            clusters: vec![WeightedCluster::new(format!("{host}:80"), 100)],
        }],
        forward_gateway: Some("*".to_string()),
    };

    let mut snapshot = ProxyConfigSnapshot::default();
    snapshot.merge_egress(EgressTrafficPolicy {
        traffic_matches: vec![host_match("egress_a_80"), host_match("egress_b_80")],
        route_configs: vec![route("a.example.com"), route("b.example.com")],
        clusters: vec![
            EgressCluster {
                name: "a.example.com:80".to_string(),
                address: Some("a.example.com:80".to_string()),
            },
            EgressCluster {
                name: "egress_c_5432_tcp".to_string(),
                address: None,
            },
        ],
    });

    let matches = &snapshot.egress.traffic_matches[&80];
    assert_eq!(matches.len(), 1);
    let hosts = matches[0]
        .http_service_route_rules
        .keys()
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(hosts, vec!["a.example.com", "b.example.com"]);
    assert_eq!(
        matches[0].http_service_route_rules["a.example.com"].egress_forward_gateway,
        Some("*".to_string())
    );
    assert!(snapshot.egress.clusters_configs["egress_c_5432_tcp"]
        .endpoints
        .is_empty());
}

#[test]
fn forward_policy_is_merged() {
    let mut snapshot = ProxyConfigSnapshot::default();
    snapshot.merge_forward(ForwardPolicy {
        matches: vec![ForwardMatch {
            rule: "*".to_string(),
            clusters: vec![WeightedCluster::new("gw/global|1080", 100)],
        }],
        gateways: vec![GatewayCluster {
            name: "gw/global|1080".to_string(),
            mode: GatewayMode::Socks5,
            endpoints: vec![("10.1.0.1:1080".to_string(), 0)],
        }],
    });

    assert_eq!(
        snapshot.forward.forward_matches,
        btreemap! { "*".to_string() => btreemap! { "gw/global|1080".to_string() => 100 } }
    );
    assert_eq!(
        snapshot.forward.egress_gateways["gw/global|1080"].mode,
        GatewayMode::Socks5
    );
}

#[test]
fn empty_sections_are_omitted() {
    let snapshot = ProxyConfigSnapshot::default();
    let value = serde_json::to_value(&snapshot).unwrap();
    let keys = value
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["spec"]);
}
