use crate::tests::{mesh, resolver};
use mesh_policy_controller_core::{
    http_route::{HttpMatch, MATCH_ALL_PATH},
    outbound::{OutboundPolicy, OutboundRouteConfig, OutboundTrafficMatch},
    weight, ClusterRef, ResourceDirectory, ServiceIdentity, ServiceRef, WeightedCluster,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;

fn client() -> ServiceIdentity {
    ServiceIdentity::new("a", "ns")
}

fn traffic_match<'p>(policy: &'p OutboundPolicy, name: &str) -> &'p OutboundTrafficMatch {
    policy
        .traffic_matches
        .iter()
        .find(|tm| tm.service.name == name)
        .unwrap_or_else(|| panic!("missing traffic match for {name}"))
}

fn route_config<'p>(policy: &'p OutboundPolicy, name: &str) -> &'p OutboundRouteConfig {
    policy
        .route_configs
        .iter()
        .find(|rc| rc.service.name == name)
        .unwrap_or_else(|| panic!("missing route config for {name}"))
}

fn wc(cluster: &str, weight: u32) -> WeightedCluster {
    WeightedCluster::new(cluster, weight)
}

#[test]
fn unsplit_service_routes_everything_to_its_cluster() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": { "permissiveTrafficPolicyMode": true },
        "namespaces": [{ "name": "ns" }],
        "services": [{
            "namespace": "ns", "name": "b", "identity": "b.ns",
            "ports": [{ "port": 8080 }],
            "endpoints": [{ "ip": "10.0.1.1", "port": 8080 }, { "ip": "10.0.1.1", "port": 8080 }]
        }]
    }));

    let policy = resolver.outbound(&mesh(&dir), &client(), &[]);
    assert_eq!(policy.traffic_matches.len(), 1);
    let tm = traffic_match(&policy, "b");
    assert_eq!(tm.service.port, 8080);
    assert_eq!(tm.destination_ranges, vec!["10.0.1.1/32".parse().unwrap()]);
    assert_eq!(tm.clusters, vec![wc("ns/b|8080", weight::ACCEPT_ALL)]);

    let rc = route_config(&policy, "b");
    assert_eq!(rc.name, "b.ns.svc.cluster.local");
    assert!(rc.hostnames.contains(&"b".to_string()));
    assert_eq!(rc.routes.len(), 1);
    assert_eq!(rc.routes[0].http_match, HttpMatch::wildcard());
    assert_eq!(rc.routes[0].clusters, vec![wc("ns/b|8080", weight::ACCEPT_ALL)]);

    assert_eq!(
        policy.clusters,
        vec![ClusterRef {
            service: ServiceRef::new("ns", "b"),
            target_port: 8080
        }]
    );
    assert!(policy.dns_resolvable.is_empty());
}

#[test]
fn active_backends_share_split_weight() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": { "permissiveTrafficPolicyMode": true },
        "namespaces": [{ "name": "ns" }],
        "services": [
            { "namespace": "ns", "name": "c", "ports": [{ "port": 80 }], "endpoints": [] },
            {
                "namespace": "ns", "name": "c-v1",
                "ports": [{ "port": 80, "targetPort": 8080 }],
                "remotePorts": [{ "port": 80, "targetPort": 8081, "lbType": "ActiveActive" }],
                "endpoints": []
            }
        ],
        "trafficSplits": [{
            "name": "c", "namespace": "ns", "apex": "c",
            "backends": [{ "service": "c-v1", "weight": 100 }]
        }]
    }));

    let policy = resolver.outbound(&mesh(&dir), &client(), &[]);
    let expected = vec![wc("ns/c-v1|8080", 50), wc("ns/c-v1|8081", 50)];
    assert_eq!(traffic_match(&policy, "c").clusters, expected);

    let rc = route_config(&policy, "c");
    assert_eq!(rc.routes.len(), 1);
    assert!(rc.routes[0].http_match.is_wildcard_path());
    assert_eq!(rc.routes[0].clusters, expected);

    let names = policy.clusters.iter().map(ClusterRef::name).collect::<Vec<_>>();
    assert!(names.contains(&"ns/c|80".to_string()));
    assert!(names.contains(&"ns/c-v1|8081".to_string()));
}

#[test]
fn failover_backends_get_failover_weight() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": { "permissiveTrafficPolicyMode": true },
        "services": [
            { "namespace": "ns", "name": "c", "ports": [{ "port": 80 }] },
            {
                "namespace": "ns", "name": "c-v1",
                "ports": [{ "port": 80 }],
                "remotePorts": [
                    { "port": 80, "targetPort": 80, "lbType": "ActiveActive" },
                    { "port": 80, "targetPort": 8082, "lbType": "FailOver" }
                ]
            }
        ],
        "trafficSplits": [{
            "name": "c", "namespace": "ns", "apex": "c",
            "backends": [{ "service": "c-v1", "weight": 100 }]
        }]
    }));

    let policy = resolver.outbound(&mesh(&dir), &client(), &[]);
    // The remote active port duplicates the local cluster and is skipped.
    assert_eq!(
        traffic_match(&policy, "c").clusters,
        vec![
            wc("ns/c-v1|80", 100),
            wc("ns/c-v1|8082", weight::FAILOVER)
        ]
    );
}

#[test]
fn split_matches_route_by_path_with_pooled_wildcard() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": { "permissiveTrafficPolicyMode": true },
        "services": [
            { "namespace": "ns", "name": "b", "ports": [{ "port": 80 }] },
            { "namespace": "ns", "name": "b-v1", "ports": [{ "port": 80 }] },
            { "namespace": "ns", "name": "b-v2", "ports": [{ "port": 80 }] }
        ],
        "httpRouteGroups": [{
            "name": "api", "namespace": "ns",
            "matches": [{ "name": "get-api", "pathRegex": "/api", "methods": ["GET"] }]
        }],
        "trafficSplits": [{
            "name": "b", "namespace": "ns", "apex": "b",
            "matches": [{ "name": "api" }, { "name": "missing" }],
            "backends": [{ "service": "b-v1", "weight": 90 }, { "service": "b-v2", "weight": 10 }]
        }]
    }));

    let policy = resolver.outbound(&mesh(&dir), &client(), &[]);
    let rc = route_config(&policy, "b");
    assert_eq!(rc.routes.len(), 2);

    let api = HttpMatch::regex("/api", vec!["GET".to_string()], BTreeMap::new());
    assert_eq!(rc.routes[0].http_match, api);
    assert_eq!(
        rc.routes[0].clusters,
        vec![wc("ns/b-v1|80", 90), wc("ns/b-v2|80", 10)]
    );

    // No split applies to all traffic, so the fallback accepts every backend
    // equally.
    assert_eq!(rc.routes[1].http_match.path, MATCH_ALL_PATH);
    assert_eq!(
        rc.routes[1].clusters,
        vec![
            wc("ns/b-v1|80", weight::ACCEPT_ALL),
            wc("ns/b-v2|80", weight::ACCEPT_ALL)
        ]
    );
}

#[test]
fn unmatched_split_provides_wildcard_clusters() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": { "permissiveTrafficPolicyMode": true },
        "services": [
            { "namespace": "ns", "name": "b", "ports": [{ "port": 80 }] },
            { "namespace": "ns", "name": "b-v1", "ports": [{ "port": 80 }] },
            { "namespace": "ns", "name": "b-v2", "ports": [{ "port": 80 }] }
        ],
        "httpRouteGroups": [{
            "name": "api", "namespace": "ns",
            "matches": [{ "name": "api", "pathRegex": "/api" }]
        }],
        "trafficSplits": [
            {
                "name": "canary", "namespace": "ns", "apex": "b",
                "matches": [{ "name": "api" }],
                "backends": [{ "service": "b-v2", "weight": 100 }]
            },
            {
                "name": "default", "namespace": "ns", "apex": "b",
                "backends": [{ "service": "b-v1", "weight": 70 }, { "service": "b-v2", "weight": 30 }]
            }
        ]
    }));

    let policy = resolver.outbound(&mesh(&dir), &client(), &[]);
    let rc = route_config(&policy, "b");
    let wildcard = rc
        .routes
        .iter()
        .find(|r| r.http_match.is_wildcard_path())
        .expect("wildcard route must be synthesized");
    assert_eq!(
        wildcard.clusters,
        vec![wc("ns/b-v1|80", 70), wc("ns/b-v2|80", 30)]
    );
    assert_eq!(traffic_match(&policy, "b").clusters, wildcard.clusters);
}

#[test]
fn tcp_services_have_no_routes() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": { "permissiveTrafficPolicyMode": true },
        "services": [
            { "namespace": "ns", "name": "db", "ports": [{ "port": 5432, "protocol": "tcp-server-first" }] }
        ]
    }));

    let policy = resolver.outbound(&mesh(&dir), &client(), &[]);
    assert_eq!(policy.traffic_matches.len(), 1);
    assert_eq!(
        policy.traffic_matches[0].name,
        "outbound_ns/db_5432_tcp"
    );
    assert!(policy.route_configs.is_empty());
}

#[test]
fn restrictive_mode_only_reaches_granted_destinations() {
    let (dir, resolver) = resolver(json!({
        "services": [
            { "namespace": "ns", "name": "b", "identity": "b.ns", "ports": [{ "port": 80 }] },
            { "namespace": "ns", "name": "d", "identity": "d.ns", "ports": [{ "port": 80 }] }
        ],
        "accessRules": [
            { "name": "a-to-b", "namespace": "ns", "destination": "b.ns", "sources": ["a.ns"] },
            { "name": "e-to-d", "namespace": "ns", "destination": "d.ns", "sources": ["e.ns"] }
        ]
    }));

    let policy = resolver.outbound(&mesh(&dir), &client(), &[]);
    let names = policy
        .traffic_matches
        .iter()
        .map(|tm| tm.service.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["b"]);
}

#[test]
fn services_without_mesh_endpoints_are_dns_resolvable() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": { "permissiveTrafficPolicyMode": true },
        "namespaces": [{ "name": "ns" }],
        "services": [
            {
                "namespace": "ns", "name": "local", "ports": [{ "port": 80 }],
                "endpoints": [{ "ip": "10.0.0.1", "port": 80 }]
            },
            {
                "namespace": "ns", "name": "remote", "ports": [{ "port": 80 }],
                "endpoints": [{
                    "ip": "10.9.0.1", "port": 80,
                    "cluster": { "cluster": "east", "lbType": "ActiveActive" }
                }]
            },
            {
                "namespace": "unmonitored", "name": "ext", "ports": [{ "port": 80 }],
                "endpoints": [{ "ip": "10.8.0.1", "port": 80 }]
            }
        ]
    }));

    let policy = resolver.outbound(&mesh(&dir), &client(), &[]);
    let resolvable = policy.dns_resolvable.keys().cloned().collect::<Vec<_>>();
    assert_eq!(
        resolvable,
        vec![
            "ext.unmonitored.svc.cluster.local".to_string(),
            "remote.ns.svc.cluster.local".to_string()
        ]
    );
}

#[test]
fn egress_marks_out_of_mesh_services_as_intra_cluster() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": { "permissiveTrafficPolicyMode": true },
        "services": [{
            "namespace": "unmonitored", "name": "ext", "ports": [{ "port": 80 }],
            "endpoints": [{ "ip": "10.8.0.1", "port": 80 }]
        }],
        "egresses": [{
            "name": "ext", "namespace": "ns", "sources": ["a.ns"],
            "hosts": ["ext.unmonitored.svc.cluster.local"],
            "ports": [{ "number": 80, "protocol": "http" }]
        }]
    }));

    let policy = resolver.outbound(&mesh(&dir), &client(), &[]);
    assert!(traffic_match(&policy, "ext").egress);
    assert!(policy.dns_resolvable.is_empty());
}

#[test]
fn attaches_outbound_plugins() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": { "permissiveTrafficPolicyMode": true },
        "services": [
            { "namespace": "ns", "name": "a", "identity": "a.ns", "ports": [{ "port": 80 }] },
            { "namespace": "ns", "name": "b", "ports": [{ "port": 80 }] }
        ],
        "pluginServices": [{
            "service": { "namespace": "ns", "name": "a" },
            "outbound": {
                "plugins": [{ "name": "logging" }],
                "targetServices": [{ "namespace": "ns", "name": "b", "plugins": [{ "name": "retry" }] }]
            }
        }]
    }));

    let downstream = dir.services_for_identity(&client());
    let policy = resolver.outbound(&mesh(&dir), &client(), &downstream);
    let plugins = |name: &str| {
        traffic_match(&policy, name)
            .plugins
            .iter()
            .map(|p| p.name.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(plugins("b"), vec!["logging", "retry"]);
    assert_eq!(plugins("a"), vec!["logging"]);
}

#[test]
fn clusters_require_observed_endpoints() {
    let (dir, resolver) = resolver(json!({
        "meshConfig": {
            "permissiveTrafficPolicyMode": true,
            "featureFlags": { "enableSidecarActiveHealthChecks": true }
        },
        "services": [
            {
                "namespace": "ns", "name": "b", "ports": [{ "port": 80, "targetPort": 8080 }],
                "endpoints": [
                    { "ip": "10.0.0.1", "port": 8080 },
                    { "ip": "10.0.0.1", "port": 9090 }
                ]
            },
            { "namespace": "ns", "name": "c", "ports": [{ "port": 80 }] }
        ],
        "upstreamTrafficSettings": [{
            "service": { "namespace": "ns", "name": "b" },
            "connectionSettings": { "tcp": { "maxConnections": 10 } }
        }]
    }));

    let mesh = mesh(&dir);
    let b = ClusterRef {
        service: ServiceRef::new("ns", "b"),
        target_port: 8080,
    };
    let clusters = resolver
        .outbound_clusters(&mesh, &client(), std::slice::from_ref(&b))
        .expect("endpoints are known");
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].name, "ns/b|8080");
    assert_eq!(clusters[0].endpoints.len(), 1);
    assert!(clusters[0].active_health_checks);
    assert_eq!(
        clusters[0]
            .connection_settings
            .as_ref()
            .and_then(|cs| cs.tcp.as_ref())
            .and_then(|tcp| tcp.max_connections),
        Some(10)
    );

    let c = ClusterRef {
        service: ServiceRef::new("ns", "c"),
        target_port: 80,
    };
    let err = resolver
        .outbound_clusters(&mesh, &client(), &[b, c])
        .expect_err("endpoints of c are unknown");
    assert!(err.reason().contains("ns/c"));
}
