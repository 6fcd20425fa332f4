//! Reader authentication keys.
//!
//! Every request is signed by a fresh key certified by the reader root for a short
//! window around the time of the request. The keys are never persisted.
use std::time::Duration;

use anyhow::Context;
use p256::ecdsa::SigningKey;
use x509_cert::Certificate;

use super::Error;
use crate::definitions::x509::issue::{
    issue_certificate, self_signed_certificate, signing_key_from_pem, CertificateParams, Issuer,
};
use crate::definitions::x509::{CertificateWithDer, X5Chain};

const SINGLE_USE_READER_KEY_SUBJECT: &str = "CN=OWF IC Online Verifier Single-Use Reader Key";
const GENERATED_ROOT_SUBJECT: &str = "CN=OWF IC Online Verifier Reader Root,C=ZZ";
const SINGLE_USE_VALIDITY: Duration = Duration::from_secs(10 * 60);
const GENERATED_ROOT_VALIDITY: Duration = Duration::from_secs(5 * 365 * 24 * 60 * 60);

/// The CA that certifies single-use reader keys.
pub struct ReaderRoot {
    key: SigningKey,
    certificate: CertificateWithDer,
}

impl std::fmt::Debug for ReaderRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRoot")
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

impl ReaderRoot {
    /// Load a root from a PEM certificate and its PKCS#8 PEM P-256 key.
    pub fn from_pem(certificate: &str, key: &str) -> Result<Self, Error> {
        let load = || -> anyhow::Result<Self> {
            let certificate = CertificateWithDer::from_pem(certificate.as_bytes())?;
            let key = signing_key_from_pem(key)?;
            let certified: p256::ecdsa::VerifyingKey =
                crate::definitions::x509::util::public_key(&certificate.inner)?;
            anyhow::ensure!(
                &certified == key.verifying_key(),
                "the key does not match the reader root certificate"
            );
            Ok(Self { key, certificate })
        };
        load().map_err(|e| Error::Configuration(format!("reader root: {e:#}")))
    }

    /// Mint a self-signed root, for deployments and tests without provisioned key material.
    pub fn generate() -> Result<Self, Error> {
        let generate = || -> anyhow::Result<Self> {
            let key = SigningKey::random(&mut rand::thread_rng());
            let certificate = self_signed_certificate(
                &CertificateParams::around_now(
                    GENERATED_ROOT_SUBJECT,
                    SINGLE_USE_VALIDITY,
                    GENERATED_ROOT_VALIDITY,
                )
                .ca(),
                &key,
            )?;
            Ok(Self {
                key,
                certificate: CertificateWithDer::from_cert(certificate)?,
            })
        };
        generate().map_err(|e| Error::Configuration(format!("reader root: {e:#}")))
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate.inner
    }

    pub fn certificate_pem(&self) -> Result<String, Error> {
        self.certificate
            .to_pem()
            .map_err(|e| Error::Configuration(format!("reader root: {e:#}")))
    }

    /// Mint a reader key valid from ten minutes ago until ten minutes from now.
    pub fn mint(&self) -> Result<SingleUseReaderKey, Error> {
        let mint = || -> anyhow::Result<SingleUseReaderKey> {
            let key = SigningKey::random(&mut rand::thread_rng());
            let certificate = issue_certificate(
                &CertificateParams::around_now(
                    SINGLE_USE_READER_KEY_SUBJECT,
                    SINGLE_USE_VALIDITY,
                    SINGLE_USE_VALIDITY,
                ),
                key.verifying_key(),
                Some(Issuer {
                    name: self.certificate.inner.tbs_certificate.subject.clone(),
                    key: &self.key,
                }),
                None,
            )?;
            let chain = X5Chain::builder()
                .with_certificate(certificate)?
                .with_certificate_and_der(self.certificate.clone())
                .build()
                .context("unable to build reader certificate chain")?;
            Ok(SingleUseReaderKey { key, chain })
        };
        mint().map_err(|e| Error::Configuration(format!("single-use reader key: {e:#}")))
    }
}

/// A reader key and its chain `[reader certificate, reader root]`.
#[derive(Clone)]
pub struct SingleUseReaderKey {
    pub key: SigningKey,
    pub chain: X5Chain,
}

#[cfg(test)]
mod test {
    use time::OffsetDateTime;

    use super::*;
    use crate::definitions::x509::issue::signing_key_to_pem;
    use crate::definitions::x509::{TrustManager, TrustPoint};

    #[test_log::test]
    fn minted_key_chains_to_root() {
        let root = ReaderRoot::generate().unwrap();
        let reader = root.mint().unwrap();
        assert_eq!(reader.chain.len(), 2);
        assert_eq!(
            reader.chain.end_entity_common_name(),
            "OWF IC Online Verifier Single-Use Reader Key"
        );
        let certified: p256::ecdsa::VerifyingKey =
            reader.chain.end_entity_public_key::<p256::NistP256>().unwrap();
        assert_eq!(&certified, reader.key.verifying_key());

        let mut trust = TrustManager::new();
        trust.add_trust_point(TrustPoint::new(root.certificate().clone()));
        let result = trust.verify_x5chain(&reader.chain, OffsetDateTime::now_utc());
        assert!(result.is_trusted, "{:?}", result.error);

        let later = OffsetDateTime::now_utc() + time::Duration::minutes(11);
        assert!(!trust.verify_x5chain(&reader.chain, later).is_trusted);
    }

    #[test]
    fn root_from_pem() {
        let generated = ReaderRoot::generate().unwrap();
        let certificate = generated.certificate_pem().unwrap();
        let key = signing_key_to_pem(&generated.key).unwrap();
        let loaded = ReaderRoot::from_pem(&certificate, &key).unwrap();
        assert_eq!(loaded.certificate(), generated.certificate());

        let other = signing_key_to_pem(&SigningKey::random(&mut rand::thread_rng())).unwrap();
        assert!(matches!(
            ReaderRoot::from_pem(&certificate, &other),
            Err(Error::Configuration(_))
        ));
    }
}
