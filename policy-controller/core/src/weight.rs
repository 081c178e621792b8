use serde::Serialize;

/// The weight of a cluster or endpoint that takes traffic without any
/// explicit weighting policy.
pub const ACCEPT_ALL: u32 = 100;

/// The weight of a failover-only target. Proxies only send traffic to these
/// once every weighted sibling is unavailable.
pub const FAILOVER: u32 = 0;

/// A weight that has not been assigned yet. Rebalancing replaces it.
pub const UNSET: u32 = 0;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct WeightedCluster {
    pub cluster: String,
    pub weight: u32,
}

// === impl WeightedCluster ===

impl WeightedCluster {
    pub fn new(cluster: impl Into<String>, weight: u32) -> Self {
        Self {
            cluster: cluster.into(),
            weight,
        }
    }
}

/// Splits `total` across `n` targets by repeated division.
///
/// The i-th target receives `remaining / (n - i)`, which is then subtracted
/// from `remaining`. Allocations always sum to `total`; any remainder is
/// pushed toward the later targets, so earlier targets never receive more
/// than later ones.
pub fn distribute(total: u32, n: usize) -> Vec<u32> {
    let mut remaining = total;
    (0..n)
        .map(|i| {
            let share = remaining / (n - i) as u32;
            remaining -= share;
            share
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(100, 1, vec![100])]
    #[case(100, 2, vec![50, 50])]
    #[case(100, 3, vec![33, 33, 34])]
    #[case(10, 4, vec![2, 2, 3, 3])]
    #[case(1, 3, vec![0, 0, 1])]
    #[case(0, 2, vec![0, 0])]
    fn distributes_remainder(#[case] total: u32, #[case] n: usize, #[case] expected: Vec<u32>) {
        assert_eq!(distribute(total, n), expected);
    }

    #[test]
    fn no_targets() {
        assert!(distribute(100, 0).is_empty());
    }

    proptest! {
        #[test]
        fn allocations_sum_to_total(total in 0u32..=10_000, n in 1usize..64) {
            let weights = distribute(total, n);
            prop_assert_eq!(weights.len(), n);
            prop_assert_eq!(weights.iter().sum::<u32>(), total);
        }

        #[test]
        fn allocations_never_decrease(total in 0u32..=10_000, n in 1usize..64) {
            let weights = distribute(total, n);
            prop_assert!(weights.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
