use crate::Metrics;
use chrono::{DateTime, TimeDelta, Utc};
use mesh_policy_controller_core::{
    certificate::{Certificate, CertificateAuthority, CertificateRole},
    mesh_config::MeshConfig,
    proxy::Workload,
};
use std::{sync::Arc, time::Duration};

/// Keeps proxy certificates issued and rotated.
#[derive(Clone)]
pub struct CertBinder {
    ca: Arc<dyn CertificateAuthority>,
    validity: Duration,
    trust_domain: String,
    metrics: Metrics,
}

// === impl CertBinder ===

impl CertBinder {
    pub fn new(
        ca: Arc<dyn CertificateAuthority>,
        validity: Duration,
        trust_domain: impl Into<String>,
        metrics: Metrics,
    ) -> Self {
        Self {
            ca,
            validity,
            trust_domain: trust_domain.into(),
            metrics,
        }
    }

    /// Ensures `cached` holds a current certificate for the workload.
    ///
    /// When issuance fails the proxy is left without a certificate until a
    /// later compile succeeds.
    pub(crate) async fn bind(
        &self,
        mesh: &MeshConfig,
        workload: &Workload,
        cached: &mut Option<Certificate>,
    ) {
        if mesh.sidecar_disabled_mtls {
            *cached = None;
            return;
        }
        if let Some(cert) = cached.as_ref() {
            if !self.ca.should_rotate(cert) {
                return;
            }
        }

        let now = Utc::now();
        let expiration = aligned_expiration(workload.created_at, now, self.validity);
        if cached.as_ref().map(|c| c.expiration) == Some(expiration) {
            // Reissuing now would not move the rotation window.
            return;
        }
        let validity = (expiration - now).to_std().unwrap_or(self.validity);

        let common_name = workload.identity.common_name(&self.trust_domain);
        match self
            .ca
            .issue(&common_name, CertificateRole::Service, validity)
            .await
        {
            Ok(mut cert) => {
                tracing::debug!(%common_name, %expiration, "Issued certificate");
                cert.expiration = expiration;
                self.metrics.certificate_issued();
                *cached = Some(cert);
            }
            Err(error) => {
                tracing::warn!(%common_name, %error, "Failed to issue certificate");
                self.metrics.certificate_failed();
                *cached = None;
            }
        }
    }
}

impl std::fmt::Debug for CertBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertBinder")
            .field("validity", &self.validity)
            .field("trust_domain", &self.trust_domain)
            .finish_non_exhaustive()
    }
}

/// Computes when a certificate issued `now` for a workload created at
/// `created_at` expires.
///
/// Expirations fall on multiples of `validity` after the workload's
/// creation, so rotations keep the same cadence across controller restarts.
/// The result is never before `now` and at most `validity` after it.
pub fn aligned_expiration(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    validity: Duration,
) -> DateTime<Utc> {
    let period = i64::try_from(validity.as_nanos()).unwrap_or(i64::MAX);
    let alive = (now - created_at).num_nanoseconds().unwrap_or(i64::MAX);
    let offset = round(alive.saturating_add(period / 2), period);
    created_at
        .checked_add_signed(TimeDelta::nanoseconds(offset))
        .unwrap_or_else(|| now + TimeDelta::nanoseconds(period))
}

/// Rounds `d` to the nearest multiple of `m`, halfway values away from
/// zero.
fn round(d: i64, m: i64) -> i64 {
    if m <= 0 {
        return d;
    }
    let r = (d % m).abs();
    let less_than_half = r.saturating_add(r) < m;
    if d < 0 {
        if less_than_half {
            d + r
        } else {
            d.saturating_sub(m - r)
        }
    } else if less_than_half {
        d - r
    } else {
        d.saturating_add(m - r)
    }
}
