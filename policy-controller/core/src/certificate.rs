use chrono::{DateTime, Utc};
use std::time::Duration;

/// Identity credentials issued to a proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    pub common_name: String,
    pub cert_chain: String,
    pub private_key: String,
    pub issuing_ca: String,
    pub expiration: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CertificateRole {
    Service,
    Gateway,
}

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("invalid validity period {0:?}")]
    InvalidValidity(Duration),

    #[error("failed to issue certificate for {common_name}: {reason}")]
    Issue { common_name: String, reason: String },
}

/// Issues proxy certificates.
#[async_trait::async_trait]
pub trait CertificateAuthority: Send + Sync {
    async fn issue(
        &self,
        common_name: &str,
        role: CertificateRole,
        validity: Duration,
    ) -> Result<Certificate, CertificateError>;

    /// Tests whether a certificate should be replaced before it expires.
    fn should_rotate(&self, cert: &Certificate) -> bool;
}

// === impl Certificate ===

// Key material is never printed.
impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("common_name", &self.common_name)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}
