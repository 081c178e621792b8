use chrono::{TimeDelta, Utc};
use mesh_policy_controller_core::certificate::{
    Certificate, CertificateAuthority, CertificateError, CertificateRole,
};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use std::time::Duration;
use time::OffsetDateTime;

/// Issues proxy certificates signed by an in-process root.
pub struct SelfSignedAuthority {
    root: rcgen::Certificate,
    root_key: KeyPair,
    root_pem: String,

    /// Certificates closer than this to expiring are rotated.
    rotate_before: TimeDelta,
}

// === impl SelfSignedAuthority ===

impl SelfSignedAuthority {
    /// Generates a root valid for `validity`. Leaf certificates are rotated
    /// once less than a third of `leaf_validity` remains.
    pub fn generate(
        common_name: &str,
        validity: Duration,
        leaf_validity: Duration,
    ) -> Result<Self, CertificateError> {
        let issue_err = |reason: rcgen::Error| CertificateError::Issue {
            common_name: common_name.to_string(),
            reason: reason.to_string(),
        };

        let root_key = KeyPair::generate().map_err(issue_err)?;
        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(issue_err)?;
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        (params.not_before, params.not_after) = validity_window(validity)?;
        let root = params.self_signed(&root_key).map_err(issue_err)?;

        let rotate_before = TimeDelta::from_std(leaf_validity / 3)
            .map_err(|_| CertificateError::InvalidValidity(leaf_validity))?;

        Ok(Self {
            root_pem: root.pem(),
            root,
            root_key,
            rotate_before,
        })
    }

    pub fn root_pem(&self) -> &str {
        &self.root_pem
    }
}

#[async_trait::async_trait]
impl CertificateAuthority for SelfSignedAuthority {
    async fn issue(
        &self,
        common_name: &str,
        role: CertificateRole,
        validity: Duration,
    ) -> Result<Certificate, CertificateError> {
        let issue_err = |reason: rcgen::Error| CertificateError::Issue {
            common_name: common_name.to_string(),
            reason: reason.to_string(),
        };

        let key = KeyPair::generate().map_err(issue_err)?;
        let mut params =
            CertificateParams::new(vec![common_name.to_string()]).map_err(issue_err)?;
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        let unit = match role {
            CertificateRole::Service => "service",
            CertificateRole::Gateway => "gateway",
        };
        params
            .distinguished_name
            .push(DnType::OrganizationalUnitName, unit);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        (params.not_before, params.not_after) = validity_window(validity)?;
        let cert = params
            .signed_by(&key, &self.root, &self.root_key)
            .map_err(issue_err)?;

        let expiration = TimeDelta::from_std(validity)
            .ok()
            .and_then(|v| Utc::now().checked_add_signed(v))
            .ok_or(CertificateError::InvalidValidity(validity))?;
        Ok(Certificate {
            common_name: common_name.to_string(),
            cert_chain: cert.pem(),
            private_key: key.serialize_pem(),
            issuing_ca: self.root_pem.clone(),
            expiration,
        })
    }

    fn should_rotate(&self, cert: &Certificate) -> bool {
        cert.expiration - Utc::now() < self.rotate_before
    }
}

impl std::fmt::Debug for SelfSignedAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfSignedAuthority")
            .field("rotate_before", &self.rotate_before)
            .finish_non_exhaustive()
    }
}

fn validity_window(
    validity: Duration,
) -> Result<(OffsetDateTime, OffsetDateTime), CertificateError> {
    if validity.is_zero() {
        return Err(CertificateError::InvalidValidity(validity));
    }
    let now = OffsetDateTime::now_utc();
    let not_after = time::Duration::try_from(validity)
        .ok()
        .and_then(|v| now.checked_add(v))
        .ok_or(CertificateError::InvalidValidity(validity))?;
    Ok((now, not_after))
}
