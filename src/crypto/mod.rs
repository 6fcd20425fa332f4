//! Encryption and signature envelopes used by the browser and OpenID4VP transports.
pub mod hpke;
pub mod jwe;
pub mod jwk;
pub mod jws;

pub use jwk::PublicKeyJwk;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid base64url encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed {0}")]
    Malformed(&'static str),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("unsupported key: {0}")]
    UnsupportedKey(String),
    #[error("invalid public key")]
    InvalidKey,
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed")]
    Decryption,
    #[error("signing failed: {0}")]
    Signing(signature::Error),
    #[error("signature verification failed")]
    SignatureInvalid,
}

pub(crate) fn b64url(bytes: impl AsRef<[u8]>) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

pub(crate) fn b64url_decode(s: &str) -> Result<Vec<u8>, Error> {
    Ok(base64::decode_config(s, base64::URL_SAFE_NO_PAD)?)
}
