use ciborium::Value as CborValue;
use coset::iana::{self, EnumI64};
use p256::EncodedPoint;
use serde::{Deserialize, Serialize};

/// An implementation of RFC-8152 [COSE_Key](https://datatracker.ietf.org/doc/html/rfc8152#section-13)
/// restricted to the EC2 keys used by ISO/IEC 18013-5 and the W3C DC API handovers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "CborValue", into = "CborValue")]
pub enum CoseKey {
    EC2 { crv: EC2Curve, x: Vec<u8>, y: EC2Y },
}

/// The sign bit or value of the y-coordinate for the EC point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EC2Y {
    Value(Vec<u8>),
    SignBit(bool),
}

/// The RFC-8152 identifier of the curve, for EC2 key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EC2Curve {
    P256,
    P384,
}

/// Errors that can occur when deserializing a COSE_Key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("COSE_Key of kty 'EC2' missing x coordinate")]
    EC2MissingX,
    #[error("COSE_Key of kty 'EC2' missing y coordinate")]
    EC2MissingY,
    #[error("Expected to parse a CBOR bool or bstr for y-coordinate, received: '{0:?}'")]
    InvalidTypeY(CborValue),
    #[error("Expected to parse a CBOR map, received: '{0:?}'")]
    NotAMap(CborValue),
    #[error("Unable to discern the elliptic curve")]
    UnknownCurve,
    #[error("This implementation of COSE_Key only supports P-256 and P-384 elliptic curves")]
    UnsupportedCurve,
    #[error("This implementation of COSE_Key only supports EC2 keys")]
    UnsupportedKeyType,
    #[error("Could not reconstruct coordinates from the provided COSE_Key")]
    InvalidCoseKey,
}

const KTY: i64 = 1;
const CRV: i64 = -1;
const X: i64 = -2;
const Y: i64 = -3;

impl CoseKey {
    pub fn curve(&self) -> EC2Curve {
        match self {
            CoseKey::EC2 { crv, .. } => *crv,
        }
    }

    /// Parse a P-256 public key out of the COSE_Key.
    pub fn to_p256(&self) -> Result<p256::PublicKey, Error> {
        use p256::elliptic_curve::sec1::FromEncodedPoint;
        if self.curve() != EC2Curve::P256 {
            return Err(Error::UnsupportedCurve);
        }
        let point = EncodedPoint::try_from(self.clone())?;
        Option::from(p256::PublicKey::from_encoded_point(&point)).ok_or(Error::InvalidCoseKey)
    }
}

impl From<&p256::PublicKey> for CoseKey {
    fn from(key: &p256::PublicKey) -> Self {
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        let point = key.to_encoded_point(false);
        CoseKey::EC2 {
            crv: EC2Curve::P256,
            x: point.x().map(|x| x.to_vec()).unwrap_or_default(),
            y: EC2Y::Value(point.y().map(|y| y.to_vec()).unwrap_or_default()),
        }
    }
}

impl From<CoseKey> for CborValue {
    fn from(key: CoseKey) -> CborValue {
        match key {
            CoseKey::EC2 { crv, x, y } => CborValue::Map(vec![
                (
                    CborValue::Integer(KTY.into()),
                    CborValue::Integer(iana::KeyType::EC2.to_i64().into()),
                ),
                (CborValue::Integer(CRV.into()), crv.into()),
                (CborValue::Integer(X.into()), CborValue::Bytes(x)),
                (CborValue::Integer(Y.into()), y.into()),
            ]),
        }
    }
}

impl TryFrom<CborValue> for CoseKey {
    type Error = Error;

    fn try_from(v: CborValue) -> Result<Self, Error> {
        let entries = match v {
            CborValue::Map(entries) => entries,
            other => return Err(Error::NotAMap(other)),
        };
        let get = |label: i64| {
            entries.iter().find_map(|(k, v)| match k {
                CborValue::Integer(i) if i128::from(*i) == label as i128 => Some(v.clone()),
                _ => None,
            })
        };

        match get(KTY) {
            Some(CborValue::Integer(kty)) if i128::from(kty) == iana::KeyType::EC2.to_i64() as i128 => {}
            _ => return Err(Error::UnsupportedKeyType),
        }
        let crv = match get(CRV) {
            Some(CborValue::Integer(crv)) => EC2Curve::try_from(i128::from(crv))?,
            _ => return Err(Error::UnknownCurve),
        };
        let x = match get(X) {
            Some(CborValue::Bytes(x)) => x,
            _ => return Err(Error::EC2MissingX),
        };
        let y = get(Y).ok_or(Error::EC2MissingY)?.try_into()?;
        Ok(CoseKey::EC2 { crv, x, y })
    }
}

impl TryFrom<CoseKey> for EncodedPoint {
    type Error = Error;

    fn try_from(value: CoseKey) -> Result<EncodedPoint, Self::Error> {
        match value {
            CoseKey::EC2 { x, y, .. } => {
                if x.len() != 32 {
                    return Err(Error::InvalidCoseKey);
                }
                let x_generic_array = p256::FieldBytes::clone_from_slice(&x);
                match y {
                    EC2Y::Value(y) if y.len() == 32 => {
                        let y_generic_array = p256::FieldBytes::clone_from_slice(&y);
                        Ok(EncodedPoint::from_affine_coordinates(
                            &x_generic_array,
                            &y_generic_array,
                            false,
                        ))
                    }
                    EC2Y::Value(_) => Err(Error::InvalidCoseKey),
                    EC2Y::SignBit(y) => {
                        let mut bytes = vec![if y { 3 } else { 2 }];
                        bytes.extend_from_slice(&x);
                        EncodedPoint::from_bytes(bytes).map_err(|_| Error::InvalidCoseKey)
                    }
                }
            }
        }
    }
}

impl From<EC2Y> for CborValue {
    fn from(y: EC2Y) -> CborValue {
        match y {
            EC2Y::Value(s) => CborValue::Bytes(s),
            EC2Y::SignBit(b) => CborValue::Bool(b),
        }
    }
}

impl TryFrom<CborValue> for EC2Y {
    type Error = Error;

    fn try_from(v: CborValue) -> Result<Self, Error> {
        match v {
            CborValue::Bytes(s) => Ok(EC2Y::Value(s)),
            CborValue::Bool(b) => Ok(EC2Y::SignBit(b)),
            _ => Err(Error::InvalidTypeY(v)),
        }
    }
}

impl From<EC2Curve> for CborValue {
    fn from(crv: EC2Curve) -> CborValue {
        match crv {
            EC2Curve::P256 => CborValue::Integer(iana::EllipticCurve::P_256.to_i64().into()),
            EC2Curve::P384 => CborValue::Integer(iana::EllipticCurve::P_384.to_i64().into()),
        }
    }
}

impl TryFrom<i128> for EC2Curve {
    type Error = Error;

    fn try_from(crv_id: i128) -> Result<Self, Error> {
        match crv_id {
            1 => Ok(EC2Curve::P256),
            2 => Ok(EC2Curve::P384),
            _ => Err(Error::UnsupportedCurve),
        }
    }
}
