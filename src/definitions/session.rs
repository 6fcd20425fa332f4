//! Session transcripts for the browser and remote presentation transports.
//!
//! Every transcript has the shape `[DeviceEngagementBytes, EReaderKeyBytes, Handover]`
//! where the first two elements are always `null` for these transports. Both parties
//! compute the transcript independently, so the encoding must be byte-for-byte stable.

use ciborium::Value;
use sha2::{Digest, Sha256};

use crate::cbor::{self, CborError};
use crate::definitions::device_key::CoseKey;

pub const BROWSER_HANDOVER_V1: &str = "BrowserHandoverv1";
pub const ARF_HANDOVER_V2: &str = "ARFHandoverv2";
pub const ARF_ENCRYPTION_INFO_V2: &str = "ARFEncryptionv2";

/// The transport-specific part of a session transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Handover {
    /// `["BrowserHandoverv1", nonce, OriginInfoBytes, pkRHash]`
    BrowserPreview {
        nonce: Vec<u8>,
        origin_info_bytes: Vec<u8>,
        requester_id_hash: Vec<u8>,
    },
    /// `["ARFHandoverv2", base64url(EncryptionInfo), origin]`
    Arf {
        encryption_info: String,
        origin: String,
    },
    /// ISO/IEC 18013-7 Annex B: `[clientIdHash, responseUriHash, ? nonce]`
    OpenId4Vp {
        client_id_hash: Vec<u8>,
        response_uri_hash: Vec<u8>,
        authorization_request_nonce: Option<String>,
    },
}

impl Handover {
    fn to_cbor_value(&self) -> Value {
        match self {
            Handover::BrowserPreview {
                nonce,
                origin_info_bytes,
                requester_id_hash,
            } => Value::Array(vec![
                Value::Text(BROWSER_HANDOVER_V1.into()),
                Value::Bytes(nonce.clone()),
                Value::Bytes(origin_info_bytes.clone()),
                Value::Bytes(requester_id_hash.clone()),
            ]),
            Handover::Arf {
                encryption_info,
                origin,
            } => Value::Array(vec![
                Value::Text(ARF_HANDOVER_V2.into()),
                Value::Text(encryption_info.clone()),
                Value::Text(origin.clone()),
            ]),
            Handover::OpenId4Vp {
                client_id_hash,
                response_uri_hash,
                authorization_request_nonce,
            } => {
                let mut items = vec![
                    Value::Bytes(client_id_hash.clone()),
                    Value::Bytes(response_uri_hash.clone()),
                ];
                if let Some(nonce) = authorization_request_nonce {
                    items.push(Value::Text(nonce.clone()));
                }
                Value::Array(items)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionTranscript(pub Handover);

impl SessionTranscript {
    /// Transcript for the W3C Digital Credentials "preview" protocol.
    ///
    /// `OriginInfoBytes` is the encoding of `{"cat": 1, "type": 1, "details": {"baseUrl": origin}}`
    /// and `pkRHash` the SHA-256 digest of the uncompressed reader public key.
    pub fn dc_preview(
        nonce: &[u8],
        origin: &str,
        reader_public_key: &p256::PublicKey,
    ) -> Result<Self, CborError> {
        use p256::elliptic_curve::sec1::ToEncodedPoint;

        let origin_info = Value::Map(vec![
            (Value::Text("cat".into()), Value::Integer(1.into())),
            (Value::Text("type".into()), Value::Integer(1.into())),
            (
                Value::Text("details".into()),
                Value::Map(vec![(
                    Value::Text("baseUrl".into()),
                    Value::Text(origin.into()),
                )]),
            ),
        ]);
        let uncompressed = reader_public_key.to_encoded_point(false);
        Ok(Self(Handover::BrowserPreview {
            nonce: nonce.to_vec(),
            origin_info_bytes: cbor::to_vec(&origin_info)?,
            requester_id_hash: Sha256::digest(uncompressed.as_bytes()).to_vec(),
        }))
    }

    /// Transcript for the W3C Digital Credentials ARF protocol.
    pub fn dc_arf(encryption_info: &ArfEncryptionInfo, origin: &str) -> Result<Self, CborError> {
        Ok(Self(Handover::Arf {
            encryption_info: encryption_info.to_base64url()?,
            origin: origin.to_string(),
        }))
    }

    /// Transcript for OpenID4VP, as defined in ISO/IEC 18013-7 Annex B.
    pub fn openid4vp(
        client_id: &str,
        response_uri: &str,
        authorization_request_nonce: Option<&str>,
        mdoc_generated_nonce: Option<&str>,
    ) -> Result<Self, CborError> {
        let hash = |first: &str| -> Result<Vec<u8>, CborError> {
            let mut items = vec![Value::Text(first.into())];
            if let Some(nonce) = mdoc_generated_nonce {
                items.push(Value::Text(nonce.into()));
            }
            Ok(Sha256::digest(cbor::to_vec(&Value::Array(items))?).to_vec())
        };
        Ok(Self(Handover::OpenId4Vp {
            client_id_hash: hash(client_id)?,
            response_uri_hash: hash(response_uri)?,
            authorization_request_nonce: authorization_request_nonce.map(str::to_string),
        }))
    }

    pub fn handover(&self) -> &Handover {
        &self.0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CborError> {
        cbor::to_vec(&Value::Array(vec![
            Value::Null,
            Value::Null,
            self.0.to_cbor_value(),
        ]))
    }
}

/// `EncryptionInfo = ["ARFEncryptionv2", {"nonce": bstr, "readerPublicKey": COSE_Key}]`
#[derive(Debug, Clone, PartialEq)]
pub struct ArfEncryptionInfo {
    pub nonce: Vec<u8>,
    pub reader_public_key: CoseKey,
}

impl ArfEncryptionInfo {
    pub fn new(nonce: &[u8], reader_public_key: &p256::PublicKey) -> Self {
        Self {
            nonce: nonce.to_vec(),
            reader_public_key: CoseKey::from(reader_public_key),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CborError> {
        cbor::to_vec(&Value::Array(vec![
            Value::Text(ARF_ENCRYPTION_INFO_V2.into()),
            Value::Map(vec![
                (Value::Text("nonce".into()), Value::Bytes(self.nonce.clone())),
                (
                    Value::Text("readerPublicKey".into()),
                    self.reader_public_key.clone().into(),
                ),
            ]),
        ]))
    }

    pub fn to_base64url(&self) -> Result<String, CborError> {
        Ok(base64::encode_config(self.to_bytes()?, base64::URL_SAFE_NO_PAD))
    }
}
