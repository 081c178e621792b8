use crate::{ProxyConfigSnapshot, SnapshotError};
use mesh_policy_controller_core::plugin::PluginSet;
use sha2::{Digest, Sha256};
use std::fmt;

/// A digest of a snapshot's policy content.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

// === impl Fingerprint ===

impl Fingerprint {
    fn digest(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// === impl ProxyConfigSnapshot ===

impl ProxyConfigSnapshot {
    /// Fingerprints the snapshot's policy content together with the loaded
    /// plugin set.
    ///
    /// The timestamp, version and certificate material do not contribute;
    /// the certificate's expiration does.
    pub fn fingerprint(&self, plugin_set_version: &str) -> Result<Fingerprint, SnapshotError> {
        let mut content = self.clone();
        content.ts = None;
        content.version = None;
        if let Some(cert) = content.certificate.as_mut() {
            cert.common_name = None;
            cert.cert_chain = None;
            cert.private_key = None;
            cert.issuing_ca = None;
        }

        let mut bytes = serde_json::to_vec(&content)?;
        bytes.extend_from_slice(plugin_set_version.as_bytes());
        Ok(Fingerprint::digest(&bytes))
    }

    /// Renders the snapshot for publishing.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Versions the content of a plugin set.
pub fn plugin_set_version(plugins: &PluginSet) -> String {
    let mut hasher = Sha256::new();
    for plugin in plugins.iter() {
        hasher.update(plugin.name.as_bytes());
        hasher.update([0]);
        hasher.update(plugin.priority.to_bits().to_be_bytes());
        hasher.update(plugin.script.as_bytes());
        hasher.update([0]);
    }
    hex::encode(&hasher.finalize()[..8])
}
