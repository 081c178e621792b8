use crate::{route::HttpRouteRule, HttpRouteRuleSet, InboundTrafficMatch, ProxyConfigSnapshot};
use mesh_policy_controller_core::{http_route::MATCH_ALL_PATH, IpNet};
use std::cmp::Ordering;

impl ProxyConfigSnapshot {
    /// Orders traffic matches and route rules so that a proxy evaluating
    /// them front to back selects the most specific entry first.
    pub fn reorder(&mut self) {
        for matches in self.outbound.traffic_matches.values_mut() {
            for m in matches.iter_mut() {
                sort_ranges(&mut m.destination_ip_ranges);
                m.http_service_route_rules.values_mut().for_each(sort_rules);
            }
            matches.sort_by(|a, b| {
                by_specificity(&a.destination_ip_ranges, &b.destination_ip_ranges)
            });
        }

        for matches in self.inbound.traffic_matches.values_mut() {
            for m in matches.iter_mut() {
                m.http_service_route_rules.values_mut().for_each(sort_rules);
            }
            matches.sort_by(|a, b| by_specificity(&source_nets(a), &source_nets(b)));
        }

        for matches in self.egress.traffic_matches.values_mut() {
            for m in matches.iter_mut() {
                sort_ranges(&mut m.destination_ip_ranges);
                m.http_service_route_rules.values_mut().for_each(sort_rules);
            }
            matches.sort_by(|a, b| {
                by_specificity(&a.destination_ip_ranges, &b.destination_ip_ranges)
            });
        }
    }
}

/// Compares two sets of destination ranges, most specific first.
///
/// Sets with ranges precede empty sets. Otherwise each side's prefix
/// lengths are compared pairwise, longest first; when those agree, the set
/// with fewer ranges is more specific.
pub fn by_specificity(a: &[IpNet], b: &[IpNet]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    let prefixes = |nets: &[IpNet]| {
        let mut lens = nets.iter().map(IpNet::prefix_len).collect::<Vec<_>>();
        lens.sort_unstable_by(|x, y| y.cmp(x));
        lens
    };
    let (a_lens, b_lens) = (prefixes(a), prefixes(b));
    for (x, y) in a_lens.iter().zip(&b_lens) {
        if x != y {
            return y.cmp(x);
        }
    }
    a_lens.len().cmp(&b_lens.len())
}

fn source_nets(m: &InboundTrafficMatch) -> Vec<IpNet> {
    m.source_ip_ranges
        .keys()
        .filter_map(|k| k.parse().ok())
        .collect()
}

fn sort_ranges(nets: &mut [IpNet]) {
    nets.sort_by(|a, b| b.prefix_len().cmp(&a.prefix_len()).then_with(|| a.cmp(b)));
}

fn sort_rules(set: &mut HttpRouteRuleSet) {
    set.route_rules.sort_by(by_path);
}

// The match-all path sorts after every other path.
fn by_path(a: &HttpRouteRule, b: &HttpRouteRule) -> Ordering {
    match (a.path == MATCH_ALL_PATH, b.path == MATCH_ALL_PATH) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.path.cmp(&b.path),
    }
}
