//! Compact JWS (RFC 7515) with ES256 only.

use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signature::{Signer, Verifier};

use super::{b64url, b64url_decode, Error};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Standard base64 DER certificates, end-entity first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
}

impl Header {
    pub fn es256() -> Self {
        Self {
            alg: "ES256".into(),
            ..Self::default()
        }
    }
}

/// A decoded compact JWS: header, claims and the signature over `signing_input`.
#[derive(Clone, Debug)]
pub struct Jws<T> {
    pub header: Header,
    pub claims: T,
    signing_input: String,
    signature: Vec<u8>,
}

/// Sign `claims` and return the compact serialization.
pub fn encode<T: Serialize>(header: &Header, claims: &T, key: &SigningKey) -> Result<String, Error> {
    if header.alg != "ES256" {
        return Err(Error::UnsupportedAlgorithm(header.alg.clone()));
    }
    let header = b64url(serde_json::to_vec(header)?);
    let claims = b64url(serde_json::to_vec(claims)?);
    let signing_input = format!("{header}.{claims}");
    let signature: Signature = key.try_sign(signing_input.as_bytes()).map_err(Error::Signing)?;
    Ok(format!("{signing_input}.{}", b64url(signature.to_bytes())))
}

/// Split and decode a compact JWS without checking its signature.
pub fn decode<T: DeserializeOwned>(token: &str) -> Result<Jws<T>, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header, claims, signature] = parts.as_slice() else {
        return Err(Error::Malformed("JWS"));
    };
    let parsed_header: Header = serde_json::from_slice(&b64url_decode(header)?)?;
    if parsed_header.alg != "ES256" {
        return Err(Error::UnsupportedAlgorithm(parsed_header.alg));
    }
    Ok(Jws {
        header: parsed_header,
        claims: serde_json::from_slice(&b64url_decode(claims)?)?,
        signing_input: format!("{header}.{claims}"),
        signature: b64url_decode(signature)?,
    })
}

impl<T> Jws<T> {
    pub fn verify(&self, key: &VerifyingKey) -> Result<(), Error> {
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| Error::Malformed("ES256 signature"))?;
        key.verify(self.signing_input.as_bytes(), &signature)
            .map_err(|_| Error::SignatureInvalid)
    }
}

/// Decode the header of a compact JWS, e.g. to locate its verification key.
pub fn decode_header(token: &str) -> Result<Header, Error> {
    Ok(decode::<Value>(token)?.header)
}
