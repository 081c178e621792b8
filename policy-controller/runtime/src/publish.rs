use crate::{proxy::ProxyState, Metrics, Outcome};
use chrono::Utc;
use mesh_policy_controller_core::{
    certificate::Certificate,
    store::{ConfigFile, ConfigStore, StoreError},
};
use mesh_policy_controller_snapshot::{Fingerprint, ProxyConfigSnapshot, SnapshotError};
use std::sync::Arc;

/// The name of the published configuration file.
pub const CONFIG_FILE: &str = "config.json";

/// Writes compiled snapshots to the config store when their content
/// changes.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ConfigStore>,
    template: String,
    prefix: String,
    metrics: Metrics,
}

#[derive(Debug, thiserror::Error)]
enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

// === impl Publisher ===

impl Publisher {
    /// Publishes into namespaces named `{prefix}/{key}`, each derived from
    /// the `template` namespace.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        template: impl Into<String>,
        prefix: impl Into<String>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            template: template.into(),
            prefix: prefix.into(),
            metrics,
        }
    }

    pub fn namespace(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }

    /// Publishes `snapshot` unless its content matches what was last
    /// published for the proxy.
    ///
    /// The proxy's published fingerprint only advances once the store has
    /// accepted the write.
    pub(crate) async fn publish(
        &self,
        key: &str,
        snapshot: ProxyConfigSnapshot,
        plugin_set_version: &str,
        state: &mut ProxyState,
    ) -> Outcome {
        let fingerprint = match snapshot.fingerprint(plugin_set_version) {
            Ok(fp) => fp,
            Err(error) => {
                tracing::warn!(%error, "Failed to fingerprint configuration");
                return Outcome::Failed;
            }
        };
        if state.published.as_ref() == Some(&fingerprint) {
            tracing::debug!(version = %fingerprint, "Configuration unchanged");
            return Outcome::Unchanged;
        }

        let namespace = self.namespace(key);
        match self
            .write(&namespace, &fingerprint, snapshot, state.certificate.as_ref())
            .await
        {
            Ok(()) => {
                tracing::info!(%namespace, version = %fingerprint, "Published configuration");
                state.published = Some(fingerprint.clone());
                Outcome::Published(fingerprint)
            }
            Err(error) => {
                tracing::warn!(%namespace, %error, "Failed to publish configuration");
                self.metrics.publish_failed();
                Outcome::Failed
            }
        }
    }

    async fn write(
        &self,
        namespace: &str,
        fingerprint: &Fingerprint,
        mut snapshot: ProxyConfigSnapshot,
        certificate: Option<&Certificate>,
    ) -> Result<(), PublishError> {
        let version = fingerprint.as_str();
        self.store
            .derive_namespace(namespace, &self.template, version)
            .await?;

        snapshot.ts = Some(Utc::now());
        snapshot.version = Some(version.to_string());
        if let Some(cert) = certificate {
            snapshot.attach_credentials(cert);
        }
        let content = snapshot.to_pretty_json()?;

        self.store
            .write_namespace(
                namespace,
                version,
                vec![ConfigFile {
                    path: CONFIG_FILE.to_string(),
                    content,
                }],
            )
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("template", &self.template)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
