use coset::cbor::Value;
use coset::{iana, AsCborValue, CoseSign1Builder, HeaderBuilder, Label, RegisteredLabelWithPrivate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use signature::{SignatureEncoding, Signer, Verifier};

use crate::cose::SignatureAlgorithm;
use crate::definitions::x509::x5chain::{X5Chain, X5CHAIN_COSE_HEADER_LABEL};

/// A COSE_Sign1 structure which serializes as its untagged CBOR representation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoseSign1(pub coset::CoseSign1);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("COSE error: {0:?}")]
    Cose(coset::CoseError),
    #[error("unable to produce a signature: {0}")]
    Signing(signature::Error),
    #[error("unsupported signature algorithm: {0:?}")]
    UnsupportedAlgorithm(Option<RegisteredLabelWithPrivate<iana::Algorithm>>),
    #[error("the signature is not a valid raw ECDSA signature")]
    MalformedSignature,
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("no x5chain in the COSE headers")]
    MissingX5Chain,
    #[error("the x5chain header could not be parsed: {0}")]
    InvalidX5Chain(anyhow::Error),
    #[error("the COSE_Sign1 payload is {0}")]
    UnexpectedPayload(&'static str),
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl CoseSign1 {
    /// Sign a payload which is transported separately from the COSE_Sign1, carrying the
    /// signer's certificate chain in the unprotected header.
    pub fn sign_detached<S, Sig>(signer: &S, payload: &[u8], x5chain: &X5Chain) -> Result<Self>
    where
        S: Signer<Sig> + SignatureAlgorithm,
        Sig: SignatureEncoding,
    {
        Self::builder(signer, x5chain).sign(signer, |builder, sign| {
            builder.create_detached_signature(payload, &[], sign)
        })
    }

    /// Sign a payload which is embedded in the COSE_Sign1.
    pub fn sign_attached<S, Sig>(signer: &S, payload: Vec<u8>, x5chain: &X5Chain) -> Result<Self>
    where
        S: Signer<Sig> + SignatureAlgorithm,
        Sig: SignatureEncoding,
    {
        Self::builder(signer, x5chain).sign(signer, |builder, sign| {
            builder.payload(payload).create_signature(&[], sign)
        })
    }

    fn builder<S: SignatureAlgorithm>(signer: &S, x5chain: &X5Chain) -> PreparedSign1 {
        let protected = HeaderBuilder::new().algorithm(signer.algorithm()).build();
        let unprotected = HeaderBuilder::new()
            .value(X5CHAIN_COSE_HEADER_LABEL, x5chain.into_cbor())
            .build();
        PreparedSign1(
            CoseSign1Builder::new()
                .protected(protected)
                .unprotected(unprotected),
        )
    }

    pub fn algorithm(&self) -> Option<&RegisteredLabelWithPrivate<iana::Algorithm>> {
        self.0.protected.header.alg.as_ref()
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.0.payload.as_deref()
    }

    /// Retrieve the x5chain from the unprotected or protected header.
    pub fn x5chain(&self) -> Result<X5Chain> {
        let label = Label::Int(X5CHAIN_COSE_HEADER_LABEL);
        self.0
            .unprotected
            .rest
            .iter()
            .chain(self.0.protected.header.rest.iter())
            .find(|(l, _)| l == &label)
            .map(|(_, value)| X5Chain::from_cbor(value.clone()).map_err(Error::InvalidX5Chain))
            .ok_or(Error::MissingX5Chain)?
    }

    /// Verify the signature over a detached payload with the given key.
    pub fn verify_detached<V, Sig>(&self, verifier: &V, payload: &[u8]) -> Result<()>
    where
        V: Verifier<Sig> + SignatureAlgorithm,
        Sig: SignatureEncoding,
    {
        if self.0.payload.is_some() {
            return Err(Error::UnexpectedPayload("attached"));
        }
        self.check_algorithm(verifier)?;
        self.0
            .verify_detached_signature(payload, &[], |sig, data| verify(verifier, sig, data))
    }

    /// Verify the signature over the embedded payload with the given key.
    pub fn verify_attached<V, Sig>(&self, verifier: &V) -> Result<()>
    where
        V: Verifier<Sig> + SignatureAlgorithm,
        Sig: SignatureEncoding,
    {
        if self.0.payload.is_none() {
            return Err(Error::UnexpectedPayload("detached"));
        }
        self.check_algorithm(verifier)?;
        self.0
            .verify_signature(&[], |sig, data| verify(verifier, sig, data))
    }

    /// Verify the signature with the public key of the x5chain end-entity certificate,
    /// using the curve named by the protected `alg` header.
    pub fn verify_with_x5chain(&self, detached_payload: Option<&[u8]>) -> Result<()> {
        let x5chain = self.x5chain()?;
        match self.algorithm() {
            Some(RegisteredLabelWithPrivate::Assigned(iana::Algorithm::ES256)) => {
                let key: p256::ecdsa::VerifyingKey = x5chain
                    .end_entity_public_key::<p256::NistP256>()
                    .map_err(Error::InvalidX5Chain)?;
                self.verify_with::<_, p256::ecdsa::Signature>(&key, detached_payload)
            }
            Some(RegisteredLabelWithPrivate::Assigned(iana::Algorithm::ES384)) => {
                let key: p384::ecdsa::VerifyingKey = x5chain
                    .end_entity_public_key::<p384::NistP384>()
                    .map_err(Error::InvalidX5Chain)?;
                self.verify_with::<_, p384::ecdsa::Signature>(&key, detached_payload)
            }
            other => Err(Error::UnsupportedAlgorithm(other.cloned())),
        }
    }

    fn verify_with<V, Sig>(&self, key: &V, detached_payload: Option<&[u8]>) -> Result<()>
    where
        V: Verifier<Sig> + SignatureAlgorithm,
        Sig: SignatureEncoding,
    {
        match detached_payload {
            Some(payload) => self.verify_detached(key, payload),
            None => self.verify_attached(key),
        }
    }

    fn check_algorithm<V: SignatureAlgorithm>(&self, verifier: &V) -> Result<()> {
        match self.algorithm() {
            Some(RegisteredLabelWithPrivate::Assigned(alg)) if *alg == verifier.algorithm() => {
                Ok(())
            }
            other => Err(Error::UnsupportedAlgorithm(other.cloned())),
        }
    }
}

struct PreparedSign1(CoseSign1Builder);

impl PreparedSign1 {
    fn sign<S, Sig, F>(self, signer: &S, build: F) -> Result<CoseSign1>
    where
        S: Signer<Sig>,
        Sig: SignatureEncoding,
        F: FnOnce(CoseSign1Builder, &mut dyn FnMut(&[u8]) -> Vec<u8>) -> CoseSign1Builder,
    {
        let mut failure = None;
        let mut sign = |data: &[u8]| match signer.try_sign(data) {
            Ok(sig) => sig.to_vec(),
            Err(e) => {
                failure = Some(e);
                vec![]
            }
        };
        let sign1 = build(self.0, &mut sign).build();
        match failure {
            Some(e) => Err(Error::Signing(e)),
            None => Ok(CoseSign1(sign1)),
        }
    }
}

fn verify<V, Sig>(verifier: &V, sig: &[u8], data: &[u8]) -> Result<()>
where
    V: Verifier<Sig>,
    Sig: SignatureEncoding,
{
    let sig = Sig::try_from(sig).map_err(|_| Error::MalformedSignature)?;
    verifier
        .verify(data, &sig)
        .map_err(|_| Error::VerificationFailed)
}

impl Serialize for CoseSign1 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0
            .clone()
            .to_cbor_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CoseSign1 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = match Value::deserialize(deserializer)? {
            // Tolerate the optional COSE_Sign1 tag.
            Value::Tag(18, inner) => *inner,
            value => value,
        };
        let inner = coset::CoseSign1::from_cbor_value(value).map_err(serde::de::Error::custom)?;
        Ok(CoseSign1(inner))
    }
}
