//! Trust decisions for certificate chains.
//!
//! A chain is walked from its end-entity certificate towards a trust point. Certificates
//! missing from the presented chain are looked up among the trust points by issuer name,
//! so a chain consisting of only a document signer certificate can still reach a root.

use time::OffsetDateTime;
use x509_cert::Certificate;

use super::util::common_name_or_unknown;
use super::validation::{check_validity_period_at, verify_chain_signatures, ValidityError};
use super::X5Chain;

/// A certificate trusted a priori. It need not be a CA certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPoint {
    pub certificate: Certificate,
    pub display_name: Option<String>,
}

impl TrustPoint {
    pub fn new(certificate: Certificate) -> Self {
        Self {
            certificate,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| common_name_or_unknown(&self.certificate))
    }

    /// Trust points are identified by subject and public key.
    fn matches(&self, certificate: &Certificate) -> bool {
        let ours = &self.certificate.tbs_certificate;
        let theirs = &certificate.tbs_certificate;
        ours.subject == theirs.subject
            && ours.subject_public_key_info == theirs.subject_public_key_info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    #[error("Certificate is not yet valid")]
    NotYetValid,
    #[error("Certificate is no longer valid")]
    NoLongerValid,
    #[error("No trusted root certificate could be found")]
    NoTrustAnchor,
}

impl From<ValidityError> for TrustError {
    fn from(e: ValidityError) -> Self {
        match e {
            ValidityError::NotYetValid => TrustError::NotYetValid,
            ValidityError::Expired => TrustError::NoLongerValid,
        }
    }
}

/// Outcome of a trust decision. An untrusted chain is a result, not a failure.
#[derive(Debug, Clone)]
pub struct TrustVerificationResult {
    pub is_trusted: bool,
    /// The walked chain, end-entity first, up to the top-most trust point reached.
    pub trust_chain: Vec<Certificate>,
    pub error: Option<TrustError>,
}

#[derive(Debug, Clone, Default)]
pub struct TrustManager {
    trust_points: Vec<TrustPoint>,
}

impl TrustManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trust_point(&mut self, trust_point: TrustPoint) {
        if !self.trust_points.contains(&trust_point) {
            self.trust_points.push(trust_point);
        }
    }

    pub fn trust_points(&self) -> &[TrustPoint] {
        &self.trust_points
    }

    pub fn verify_x5chain(&self, chain: &X5Chain, now: OffsetDateTime) -> TrustVerificationResult {
        self.verify(&chain.certificates(), now)
    }

    /// Decide whether `chain` (end-entity first) is anchored in a trust point at time `now`.
    ///
    /// The walk continues past the first matching trust point as long as the issuer of the
    /// current certificate is itself a trust point, so the returned chain ends at the
    /// top-most reachable trust point. A validity failure anywhere on the walked chain is
    /// recorded (earliest only) and makes the chain untrusted even if anchored.
    pub fn verify(&self, chain: &[Certificate], now: OffsetDateTime) -> TrustVerificationResult {
        let mut walked: Vec<Certificate> = Vec::new();
        let mut anchored = false;
        let mut validity_error: Option<TrustError> = None;

        let mut next = chain.first().cloned();
        while let Some(certificate) = next.take() {
            if walked.contains(&certificate) {
                break;
            }

            if self.trust_points.iter().any(|tp| tp.matches(&certificate)) {
                anchored = true;
            }
            if let Some(e) = check_validity_period_at(&certificate, now) {
                tracing::debug!(
                    "certificate '{}' failed validity check: {e}",
                    common_name_or_unknown(&certificate)
                );
                validity_error.get_or_insert(e.into());
            }

            let position = walked.len();
            walked.push(certificate);
            let current = &walked[position];

            next = match chain.get(position + 1) {
                Some(signer) if !anchored => Some(signer.clone()),
                _ => self
                    .trust_points
                    .iter()
                    .find(|tp| {
                        tp.certificate.tbs_certificate.subject
                            == current.tbs_certificate.issuer
                            && !walked.contains(&tp.certificate)
                    })
                    .map(|tp| tp.certificate.clone()),
            };
        }

        if !anchored {
            tracing::info!("no trust point found for the certificate chain");
            return TrustVerificationResult {
                is_trusted: false,
                trust_chain: Vec::new(),
                error: Some(TrustError::NoTrustAnchor),
            };
        }

        TrustVerificationResult {
            is_trusted: validity_error.is_none(),
            trust_chain: walked,
            error: validity_error,
        }
    }

    /// Check the signature linkage of a walked trust chain.
    ///
    /// [`TrustManager::verify`] decides on names and keys only; callers that need
    /// cryptographic linkage run this over [`TrustVerificationResult::trust_chain`].
    pub fn verify_signatures(&self, trust_chain: &[Certificate]) -> Result<(), String> {
        verify_chain_signatures(trust_chain)
    }
}
