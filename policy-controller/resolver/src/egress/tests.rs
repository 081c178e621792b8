use crate::tests::resolver;
use mesh_policy_controller_core::{
    egress::{EgressCluster, GatewayMode},
    memory::MemoryDirectory,
    weight, Protocol, ServiceIdentity, WeightedCluster,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn client() -> ServiceIdentity {
    ServiceIdentity::new("a", "ns")
}

#[test]
fn unsynced_directory_is_not_ready() {
    let resolver = crate::Resolver::new(
        std::sync::Arc::new(MemoryDirectory::new()),
        std::sync::Arc::new(crate::ClusterInfo {
            cluster_domain: "cluster.local".to_string(),
            trust_domain: "cluster.local".to_string(),
        }),
    );
    assert!(resolver.egress(&client()).is_err());
}

#[test]
fn http_egress_routes_by_host() {
    let (_, resolver) = resolver(json!({
        "egresses": [{
            "name": "web", "namespace": "ns", "sources": ["a.ns"],
            "hosts": ["example.com"],
            "ports": [{ "number": 80, "protocol": "http" }]
        }, {
            "name": "other", "namespace": "ns", "sources": ["z.ns"],
            "hosts": ["other.example.com"],
            "ports": [{ "number": 80, "protocol": "http" }]
        }]
    }));

    let policy = resolver.egress(&client()).expect("directory is synced");
    assert_eq!(policy.traffic_matches.len(), 1);
    assert_eq!(policy.traffic_matches[0].name, "egress_web_80");
    assert_eq!(policy.traffic_matches[0].protocol, Protocol::Http);

    assert_eq!(policy.route_configs.len(), 1);
    let rc = &policy.route_configs[0];
    assert_eq!(rc.host, "example.com");
    assert_eq!(
        rc.hostnames,
        vec!["example.com".to_string(), "example.com:80".to_string()]
    );
    assert_eq!(
        rc.routes[0].clusters,
        vec![WeightedCluster::new("example.com:80", weight::ACCEPT_ALL)]
    );
    assert_eq!(rc.forward_gateway, None);

    assert_eq!(
        policy.clusters,
        vec![EgressCluster {
            name: "example.com:80".to_string(),
            address: Some("example.com:80".to_string()),
        }]
    );
}

#[test]
fn https_egress_matches_server_names_and_ranges() {
    let (_, resolver) = resolver(json!({
        "egresses": [{
            "name": "api", "namespace": "ns", "sources": ["a.ns"],
            "hosts": ["api.example.com", "cdn.example.com"],
            "ipAddresses": ["203.0.113.0/24"],
            "ports": [{ "number": 443, "protocol": "https" }]
        }]
    }));

    let policy = resolver.egress(&client()).expect("directory is synced");
    assert!(policy.route_configs.is_empty());

    let names = policy
        .traffic_matches
        .iter()
        .map(|tm| tm.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["egress_api_443_sni", "egress_api_443_https"]);

    let sni = &policy.traffic_matches[0];
    assert_eq!(sni.server_names, vec!["api.example.com", "cdn.example.com"]);
    assert!(sni.destination_ranges.is_empty());

    let ranges = &policy.traffic_matches[1];
    assert!(ranges.server_names.is_empty());
    assert_eq!(
        ranges.destination_ranges,
        vec!["203.0.113.0/24".parse().unwrap()]
    );

    let clusters = policy
        .clusters
        .iter()
        .map(|c| (c.name.as_str(), c.address.is_some()))
        .collect::<Vec<_>>();
    assert_eq!(
        clusters,
        vec![
            ("api.example.com:443", true),
            ("cdn.example.com:443", true),
            ("egress_api_443_https", false),
        ]
    );
}

#[test]
fn tcp_egress_requires_ranges() {
    let (_, resolver) = resolver(json!({
        "egresses": [
            {
                "name": "db", "namespace": "ns", "sources": ["a.ns"],
                "ipAddresses": ["198.51.100.7/32"],
                "ports": [{ "number": 5432, "protocol": "tcp" }]
            },
            {
                "name": "by-host", "namespace": "ns", "sources": ["a.ns"],
                "hosts": ["db.example.com"],
                "ports": [{ "number": 3306, "protocol": "tcp" }]
            }
        ]
    }));

    let policy = resolver.egress(&client()).expect("directory is synced");
    assert_eq!(policy.traffic_matches.len(), 1);
    assert_eq!(policy.traffic_matches[0].name, "egress_db_5432_tcp");
    assert_eq!(
        policy.traffic_matches[0].clusters,
        vec![WeightedCluster::new("egress_db_5432_tcp", weight::ACCEPT_ALL)]
    );
    assert_eq!(policy.clusters[0].address, None);
}

#[test]
fn gateway_rules_select_forwarding() {
    let (_, resolver) = resolver(json!({
        "services": [
            {
                "namespace": "gw", "name": "global", "ports": [{ "port": 1080 }],
                "endpoints": [{ "ip": "10.1.0.1", "port": 1080 }]
            },
            {
                "namespace": "gw", "name": "special", "ports": [{ "port": 1080 }],
                "endpoints": [
                    { "ip": "10.2.0.1", "port": 1080 },
                    { "ip": "10.2.0.1", "port": 1080 },
                    {
                        "ip": "10.9.0.1", "port": 1080,
                        "cluster": { "cluster": "east", "lbType": "ActiveActive", "weight": 40 }
                    }
                ]
            }
        ],
        "egresses": [
            {
                "name": "web", "namespace": "ns", "sources": ["a.ns"],
                "hosts": ["example.com"], "ports": [{ "number": 80, "protocol": "http" }]
            },
            {
                "name": "secret", "namespace": "ns", "sources": ["a.ns"],
                "hosts": ["secret.example.com"], "ports": [{ "number": 80, "protocol": "http" }]
            }
        ],
        "egressGateway": {
            "global": [{ "service": { "namespace": "gw", "name": "global" }, "port": 1080, "weight": 100 }],
            "rules": [{
                "name": "special",
                "egressPolicies": [{ "namespace": "ns", "name": "secret" }],
                "gateways": [{
                    "service": { "namespace": "gw", "name": "special" },
                    "port": 1080, "weight": 100, "mode": "socks5"
                }]
            }]
        }
    }));

    let egress = resolver.egress(&client()).expect("directory is synced");
    let gateways = egress
        .route_configs
        .iter()
        .map(|rc| (rc.host.as_str(), rc.forward_gateway.as_deref()))
        .collect::<Vec<_>>();
    assert_eq!(
        gateways,
        vec![("example.com", Some("*")), ("secret.example.com", Some("special"))]
    );

    let forward = resolver.forward().expect("gateway endpoints are known");
    let rules = forward
        .matches
        .iter()
        .map(|m| m.rule.as_str())
        .collect::<Vec<_>>();
    assert_eq!(rules, vec!["*", "special"]);
    assert_eq!(
        forward.matches[1].clusters,
        vec![WeightedCluster::new("gw/special|1080", 100)]
    );

    assert_eq!(forward.gateways.len(), 2);
    let special = &forward.gateways[1];
    assert_eq!(special.mode, GatewayMode::Socks5);
    assert_eq!(
        special.endpoints,
        vec![
            ("10.2.0.1:1080".to_string(), weight::UNSET),
            ("10.9.0.1:1080".to_string(), 40),
        ]
    );
}

#[test]
fn gateways_without_endpoints_are_not_ready() {
    let (_, resolver) = resolver(json!({
        "services": [{ "namespace": "gw", "name": "global", "ports": [{ "port": 1080 }] }],
        "egressGateway": {
            "global": [{ "service": { "namespace": "gw", "name": "global" }, "port": 1080 }]
        }
    }));
    let err = resolver.forward().expect_err("gateway endpoints are unknown");
    assert!(err.reason().contains("gw/global"));
}

#[test]
fn no_gateway_policy_forwards_nothing() {
    let (_, resolver) = resolver(json!({}));
    assert_eq!(resolver.forward().expect("no gateways"), Default::default());
}

#[test]
fn gateway_endpoints_use_the_declared_port() {
    let (_, resolver) = resolver(json!({
        "services": [{
            "namespace": "gw", "name": "global", "ports": [{ "port": 1080 }, { "port": 9090 }],
            "endpoints": [
                { "ip": "10.1.0.1", "port": 1080 },
                { "ip": "10.1.0.1", "port": 9090 },
                { "ip": "10.1.0.2", "port": 9090 }
            ]
        }],
        "egressGateway": {
            "global": [{ "service": { "namespace": "gw", "name": "global" }, "port": 1080 }]
        }
    }));

    let forward = resolver.forward().expect("gateway endpoints are known");
    assert_eq!(forward.gateways.len(), 1);
    assert_eq!(
        forward.gateways[0].endpoints,
        vec![
            ("10.1.0.1:1080".to_string(), weight::UNSET),
            ("10.1.0.2:1080".to_string(), weight::UNSET),
        ]
    );
}
