use super::*;
use pretty_assertions::assert_eq;

const RESOURCES: &str = r#"{
    "meshConfig": { "permissiveTrafficPolicyMode": true },
    "namespaces": [{ "name": "ns", "labels": { "mesh": "on" } }],
    "services": [
        {
            "namespace": "ns",
            "name": "b",
            "identity": "b.ns",
            "ports": [
                { "port": 8080, "targetPort": 9090 },
                { "port": 9000, "protocol": "tcp" }
            ],
            "endpoints": [{ "ip": "10.0.0.2", "port": 9090 }],
            "remotePorts": [{ "port": 8080, "targetPort": 9091, "lbType": "FailOver" }]
        },
        { "namespace": "ns", "name": "c", "ports": [{ "port": 80 }] }
    ],
    "plugins": [{ "name": "logging", "script": "log()" }]
}"#;

#[test]
fn loads_document() {
    let doc = ResourceDocument::from_json(RESOURCES.as_bytes()).expect("must parse");
    let dir = MemoryDirectory::from_document(doc);
    assert!(dir.is_synced());
    assert!(dir.mesh_config().permissive_traffic_policy_mode);
    assert!(dir.plugin_set().contains("logging"));

    let b = ServiceRef::new("ns", "b");
    let services = dir.services_for_identity(&ServiceIdentity::new("b", "ns"));
    assert_eq!(services.len(), 2);
    assert_eq!(services[0].cluster_name(), "ns/b|9090");
    assert_eq!(services[1].protocol, Protocol::Tcp);
    assert_eq!(dir.services().len(), 3);

    assert_eq!(dir.target_port(&b, 8080), Some(9090));
    assert_eq!(dir.target_port(&b, 1), None);
    assert_eq!(
        dir.multicluster_target_ports(&b, 8080),
        vec![(9091, LbType::FailOver)]
    );
    assert_eq!(dir.endpoints(&b).map(|e| e.len()), Some(1));
    assert_eq!(dir.endpoints(&ServiceRef::new("ns", "c")), None);

    let ns = dir.namespace("ns").expect("namespace must exist");
    assert!(ns.monitored);
    assert_eq!(ns.labels.get("mesh").map(String::as_str), Some("on"));
    assert!(dir.namespace("other").is_none());
}

#[test]
fn rejects_duplicate_service_ports() {
    let json = r#"{ "services": [
        { "namespace": "ns", "name": "b", "ports": [{ "port": 80 }, { "port": 80 }] }
    ] }"#;
    assert!(matches!(
        ResourceDocument::from_json(json.as_bytes()),
        Err(DirectoryError::DuplicateServicePort(_))
    ));
}

#[test]
fn unsynced_directory_has_no_egress_data() {
    let dir = MemoryDirectory::new();
    assert!(!dir.is_synced());
    assert_eq!(dir.egress_policies(&ServiceIdentity::new("a", "ns")), None);

    dir.replace(ResourceDocument::default());
    assert_eq!(
        dir.egress_policies(&ServiceIdentity::new("a", "ns")),
        Some(vec![])
    );
}

#[tokio::test(flavor = "current_thread")]
async fn updates_notify_subscribers() {
    let dir = MemoryDirectory::new();
    let mut rx = dir.subscribe();
    dir.update(|doc| doc.mesh_config.enable_egress = true);
    rx.changed().await.expect("sender must be alive");
    assert_eq!(*rx.borrow(), 1);
    assert!(dir.mesh_config().enable_egress);
}
