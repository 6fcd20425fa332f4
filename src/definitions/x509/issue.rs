//! Minting of P-256 certificates, used for the reader root and single-use reader keys.

use std::str::FromStr;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use p256::ecdsa::{DerSignature, SigningKey};
use signature::Signer;
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    ext::pkix::{BasicConstraints, KeyUsage, KeyUsages},
    name::Name,
    serial_number::SerialNumber,
    spki::{SignatureBitStringEncoding, SubjectPublicKeyInfoOwned},
    time::{Time, Validity},
    Certificate,
};

/// Parameters of a certificate to mint.
#[derive(Debug, Clone)]
pub struct CertificateParams {
    pub subject: String,
    pub not_before: SystemTime,
    pub not_after: SystemTime,
    pub ca: bool,
}

impl CertificateParams {
    /// A certificate valid from `before` ago until `after` from now.
    pub fn around_now(subject: impl Into<String>, before: Duration, after: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            subject: subject.into(),
            not_before: now - before,
            not_after: now + after,
            ca: false,
        }
    }

    pub fn ca(mut self) -> Self {
        self.ca = true;
        self
    }
}

/// The issuer of a certificate: its name and signing key.
pub struct Issuer<'a> {
    pub name: Name,
    pub key: &'a SigningKey,
}

/// Mint a certificate for `subject_key`. Without an issuer the certificate is self-signed.
pub fn issue_certificate(
    params: &CertificateParams,
    subject_key: &p256::ecdsa::VerifyingKey,
    issuer: Option<Issuer<'_>>,
    signer_of_self: Option<&SigningKey>,
) -> Result<Certificate> {
    let subject = Name::from_str(&params.subject).context("invalid subject name")?;
    let spki = SubjectPublicKeyInfoOwned::from_key(*subject_key)
        .context("unable to encode subject public key")?;
    let validity = Validity {
        not_before: Time::try_from(params.not_before).context("invalid not-before time")?,
        not_after: Time::try_from(params.not_after).context("invalid not-after time")?,
    };

    let (issuer_name, signer) = match (issuer, signer_of_self) {
        (Some(issuer), _) => (issuer.name, issuer.key),
        (None, Some(key)) => (subject.clone(), key),
        (None, None) => anyhow::bail!("a self-signed certificate needs the subject signing key"),
    };

    let mut builder = CertificateBuilder::new(
        Profile::Manual {
            issuer: Some(issuer_name),
        },
        SerialNumber::from(rand::random::<u32>()),
        validity,
        subject,
        spki,
        signer,
    )
    .context("unable to prepare certificate")?;

    if params.ca {
        builder
            .add_extension(&BasicConstraints {
                ca: true,
                path_len_constraint: None,
            })
            .context("unable to add basic constraints")?;
        builder
            .add_extension(&KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign))
            .context("unable to add key usage")?;
    } else {
        builder
            .add_extension(&KeyUsage(KeyUsages::DigitalSignature.into()))
            .context("unable to add key usage")?;
    }

    let tbs = builder.finalize().context("unable to encode tbsCertificate")?;
    let signature: DerSignature = signer.try_sign(&tbs).context("unable to sign certificate")?;
    builder
        .assemble(
            signature
                .to_bitstring()
                .context("unable to encode certificate signature")?,
        )
        .context("unable to assemble certificate")
}

/// Mint a self-signed certificate.
pub fn self_signed_certificate(params: &CertificateParams, key: &SigningKey) -> Result<Certificate> {
    issue_certificate(params, key.verifying_key(), None, Some(key))
}

/// Parse a PKCS#8 PEM P-256 private key.
pub fn signing_key_from_pem(pem: &str) -> Result<SigningKey> {
    use p256::pkcs8::DecodePrivateKey;
    SigningKey::from_pkcs8_pem(pem).map_err(|e| anyhow::anyhow!("invalid PKCS#8 key: {e}"))
}

/// Encode a P-256 private key as PKCS#8 PEM.
pub fn signing_key_to_pem(key: &SigningKey) -> Result<String> {
    use p256::pkcs8::{EncodePrivateKey, LineEnding};
    Ok(key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| anyhow::anyhow!("unable to encode PKCS#8 key: {e}"))?
        .to_string())
}
