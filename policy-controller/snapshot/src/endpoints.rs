use crate::ProxyConfigSnapshot;
use mesh_policy_controller_core::{proxy::Workload, NotReady, Readiness};
use std::collections::BTreeMap;

/// Labels addresses admitted by inbound source policies.
pub const INGRESS_CONTROLLER: &str = "Ingress Controller";

impl ProxyConfigSnapshot {
    /// Builds the map of addresses the proxy accepts connections from.
    ///
    /// Every proxy must have an address; otherwise the map is left
    /// untouched and the snapshot is not ready.
    pub fn set_allowed_endpoints<'w>(
        &mut self,
        proxies: impl IntoIterator<Item = &'w Workload>,
    ) -> Readiness<()> {
        let mut allowed = BTreeMap::new();
        for workload in proxies {
            let addr = workload.addr.ok_or_else(|| {
                NotReady::new(format!("proxy {} has no address", workload.label()))
            })?;
            allowed.insert(addr.to_string(), workload.label());
        }

        let ranges = self
            .inbound
            .traffic_matches
            .values()
            .flatten()
            .flat_map(|m| m.source_ip_ranges.keys());
        for range in ranges {
            let addr = range.strip_suffix("/32").unwrap_or(range);
            allowed
                .entry(addr.to_string())
                .or_insert_with(|| INGRESS_CONTROLLER.to_string());
        }

        self.allowed_endpoints = allowed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InboundTrafficMatch;
    use chrono::Utc;
    use maplit::btreemap;
    use mesh_policy_controller_core::{Protocol, ServiceIdentity};
    use pretty_assertions::assert_eq;

    fn workload(pod: &str, addr: Option<&str>) -> Workload {
        Workload {
            id: pod.to_string(),
            identity: ServiceIdentity::new("b", "ns"),
            namespace: "ns".to_string(),
            pod: pod.to_string(),
            labels: Default::default(),
            addr: addr.map(|a| a.parse().unwrap()),
            created_at: Utc::now(),
            probes: Default::default(),
        }
    }

    #[test]
    fn labels_proxies_and_ingress_sources() {
        let mut snapshot = ProxyConfigSnapshot::default();
        snapshot.inbound.traffic_matches.insert(
            8080,
            vec![InboundTrafficMatch {
                port: 8080,
                protocol: Protocol::Http,
                source_ip_ranges: btreemap! {
                    "192.168.1.1/32".to_string() => None,
                    "10.0.0.0/8".to_string() => None,
                },
                target_clusters: Default::default(),
                http_service_route_rules: Default::default(),
                rate_limit: None,
                plugins: vec![],
            }],
        );

        let proxies = [
            workload("b-1", Some("10.0.1.1")),
            workload("b-2", Some("10.0.1.2")),
        ];
        snapshot
            .set_allowed_endpoints(&proxies)
            .expect("all proxies have addresses");

        assert_eq!(
            snapshot.allowed_endpoints,
            btreemap! {
                "10.0.0.0/8".to_string() => INGRESS_CONTROLLER.to_string(),
                "10.0.1.1".to_string() => "ns/b-1".to_string(),
                "10.0.1.2".to_string() => "ns/b-2".to_string(),
                "192.168.1.1".to_string() => INGRESS_CONTROLLER.to_string(),
            }
        );
    }

    #[test]
    fn unaddressed_proxy_is_not_ready() {
        let mut snapshot = ProxyConfigSnapshot::default();
        let proxies = [workload("b-1", Some("10.0.1.1")), workload("b-2", None)];
        let err = snapshot
            .set_allowed_endpoints(&proxies)
            .expect_err("b-2 has no address");
        assert!(err.reason().contains("ns/b-2"));
        assert!(snapshot.allowed_endpoints.is_empty());
    }
}
