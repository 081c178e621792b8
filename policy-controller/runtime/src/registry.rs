use crate::Proxy;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use mesh_policy_controller_core::proxy::Workload;
use parking_lot::RwLock;
use std::sync::Arc;

/// The proxies currently connected to the controller, by id.
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    proxies: RwLock<HashMap<String, Arc<Proxy>>>,
}

/// Proxies whose registration changed during a sync.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Changes {
    /// Newly connected proxies and proxies whose workload changed.
    pub updated: Vec<String>,
    pub disconnected: Vec<String>,
}

// === impl ProxyRegistry ===

impl ProxyRegistry {
    /// Registers a proxy, or refreshes the workload of a known one.
    pub fn connect(&self, workload: Workload) -> Arc<Proxy> {
        let mut proxies = self.proxies.write();
        if let Some(proxy) = proxies.get(&workload.id) {
            proxy.set_workload(workload);
            return proxy.clone();
        }
        tracing::debug!(id = %workload.id, identity = %workload.identity, "Proxy connected");
        let proxy = Arc::new(Proxy::new(workload));
        proxies.insert(proxy.id().to_string(), proxy.clone());
        proxy
    }

    pub fn disconnect(&self, id: &str) -> Option<Arc<Proxy>> {
        let proxy = self.proxies.write().remove(id)?;
        tracing::debug!(%id, "Proxy disconnected");
        Some(proxy)
    }

    /// Makes the registry hold exactly the given workloads' proxies.
    pub fn sync(&self, workloads: Vec<Workload>) -> Changes {
        let mut changes = Changes::default();
        let mut proxies = self.proxies.write();

        let ids = workloads.iter().map(|w| w.id.as_str()).collect::<HashSet<_>>();
        proxies.retain(|id, _| {
            let keep = ids.contains(id.as_str());
            if !keep {
                changes.disconnected.push(id.clone());
            }
            keep
        });

        for workload in workloads {
            match proxies.get(&workload.id) {
                Some(proxy) => {
                    let id = workload.id.clone();
                    if proxy.set_workload(workload) {
                        changes.updated.push(id);
                    }
                }
                None => {
                    let proxy = Arc::new(Proxy::new(workload));
                    changes.updated.push(proxy.id().to_string());
                    proxies.insert(proxy.id().to_string(), proxy);
                }
            }
        }

        changes.updated.sort();
        changes.disconnected.sort();
        changes
    }

    pub fn get(&self, id: &str) -> Option<Arc<Proxy>> {
        self.proxies.read().get(id).cloned()
    }

    /// The ids of all connected proxies, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = self.proxies.read().keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn workloads(&self) -> Vec<Workload> {
        self.proxies.read().values().map(|p| p.workload()).collect()
    }

    pub fn len(&self) -> usize {
        self.proxies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.read().is_empty()
    }
}
