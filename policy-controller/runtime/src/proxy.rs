use mesh_policy_controller_core::{certificate::Certificate, proxy::Workload, ServiceIdentity};
use mesh_policy_controller_snapshot::Fingerprint;
use parking_lot::RwLock;
use std::fmt;
use tokio::sync::{Mutex, MutexGuard};

/// A connected proxy.
///
/// Compile jobs hold the proxy's state lock for their whole duration, so
/// jobs for one proxy never interleave.
#[derive(Debug)]
pub struct Proxy {
    id: String,
    workload: RwLock<Workload>,
    state: Mutex<ProxyState>,
}

/// What has been handed to the proxy so far.
#[derive(Debug, Default)]
pub(crate) struct ProxyState {
    /// The fingerprint of the last configuration written to the store.
    pub(crate) published: Option<Fingerprint>,

    pub(crate) certificate: Option<Certificate>,
}

// === impl Proxy ===

impl Proxy {
    pub fn new(workload: Workload) -> Self {
        Self {
            id: workload.id.clone(),
            workload: RwLock::new(workload),
            state: Mutex::new(ProxyState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> ServiceIdentity {
        self.workload.read().identity.clone()
    }

    pub fn workload(&self) -> Workload {
        self.workload.read().clone()
    }

    /// Replaces the proxy's workload metadata, returning whether it changed.
    pub(crate) fn set_workload(&self, workload: Workload) -> bool {
        let mut current = self.workload.write();
        if *current == workload {
            return false;
        }
        *current = workload;
        true
    }

    /// The key of the proxy's configuration namespace.
    pub fn config_key(&self) -> String {
        format!("{}.{}", self.id, self.workload.read().identity)
    }

    pub async fn published(&self) -> Option<Fingerprint> {
        self.state.lock().await.published.clone()
    }

    pub async fn certificate(&self) -> Option<Certificate> {
        self.state.lock().await.certificate.clone()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ProxyState> {
        self.state.lock().await
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let workload = self.workload.read();
        write!(f, "{}/{}", workload.namespace, workload.pod)
    }
}
