//! Public EC keys in JSON Web Key form (RFC 7517), restricted to P-256.

use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::EncodedPoint;
use serde::{Deserialize, Serialize};

use super::{b64url, b64url_decode, Error};

#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct PublicKeyJwk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    pub crv: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    pub x: String,
    pub y: String,
}

impl PublicKeyJwk {
    /// An encryption key for ECDH-ES key agreement, as advertised in `client_metadata.jwks`.
    pub fn encryption_key(key: &p256::PublicKey) -> Self {
        Self {
            use_: Some("enc".into()),
            alg: Some("ECDH-ES".into()),
            ..Self::from(key)
        }
    }

    pub fn to_public_key(&self) -> Result<p256::PublicKey, Error> {
        if self.kty != "EC" || self.crv != "P-256" {
            return Err(Error::UnsupportedKey(format!("{}/{}", self.kty, self.crv)));
        }
        let x = b64url_decode(&self.x)?;
        let y = b64url_decode(&self.y)?;
        if x.len() != 32 || y.len() != 32 {
            return Err(Error::InvalidKey);
        }
        let point = EncodedPoint::from_affine_coordinates(
            x.as_slice().into(),
            y.as_slice().into(),
            false,
        );
        Option::from(p256::PublicKey::from_encoded_point(&point)).ok_or(Error::InvalidKey)
    }
}

impl From<&p256::PublicKey> for PublicKeyJwk {
    fn from(key: &p256::PublicKey) -> Self {
        let point = key.to_encoded_point(false);
        // An uncompressed point always carries both coordinates.
        let x = point.x().map(b64url).unwrap_or_default();
        let y = point.y().map(b64url).unwrap_or_default();
        Self {
            kid: None,
            kty: "EC".into(),
            use_: None,
            crv: "P-256".into(),
            alg: None,
            x,
            y,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn jwk_roundtrip() {
        let key = p256::SecretKey::random(&mut rand::thread_rng()).public_key();
        let jwk = PublicKeyJwk::encryption_key(&key);
        let json = serde_json::to_value(&jwk).unwrap();
        assert_eq!(json["use"], "enc");
        assert_eq!(json["alg"], "ECDH-ES");
        assert!(json.get("kid").is_none());
        assert_eq!(jwk.to_public_key().unwrap(), key);
    }

    #[test]
    fn rejects_other_curves() {
        let jwk = PublicKeyJwk {
            kty: "OKP".into(),
            crv: "Ed25519".into(),
            ..PublicKeyJwk::default()
        };
        assert!(matches!(jwk.to_public_key(), Err(Error::UnsupportedKey(_))));
    }
}
