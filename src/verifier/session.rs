//! The persisted state of one verifier session.
use p256::SecretKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::well_known::CredentialRequest;
use super::{Error, Protocol};
use crate::cbor;
use crate::presentation::reader::PaymentContext;

/// Where a session is in its exchange with the holder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Created,
    RequestSent {
        response_uri: Option<String>,
    },
    ResponseReceived {
        #[serde(with = "serde_bytes")]
        response: Vec<u8>,
        #[serde(with = "serde_bytes")]
        session_transcript: Vec<u8>,
    },
    DataExtracted {
        #[serde(with = "serde_bytes")]
        response: Vec<u8>,
        #[serde(with = "serde_bytes")]
        session_transcript: Vec<u8>,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::RequestSent { .. } => "request_sent",
            SessionState::ResponseReceived { .. } => "response_received",
            SessionState::DataExtracted { .. } => "data_extracted",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierSession {
    pub request: CredentialRequest,
    pub protocol: Protocol,
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
    pub origin: String,
    #[serde(with = "zeroizing_bytes")]
    encryption_key: Zeroizing<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payment: Option<PaymentContext>,
    pub state: SessionState,
}

impl VerifierSession {
    pub(crate) const NONCE_LEN: usize = 16;

    pub fn new(
        request: CredentialRequest,
        protocol: Protocol,
        nonce: Vec<u8>,
        origin: String,
        encryption_key: &SecretKey,
        payment: Option<PaymentContext>,
    ) -> Self {
        Self {
            request,
            protocol,
            nonce,
            origin,
            encryption_key: Zeroizing::new(encryption_key.to_bytes().to_vec()),
            payment,
            state: SessionState::Created,
        }
    }

    /// The private key responses are encrypted to.
    pub fn encryption_key(&self) -> Result<SecretKey, Error> {
        SecretKey::from_slice(&self.encryption_key)
            .map_err(|_| Error::MalformedEncoding("session encryption key".into()))
    }

    /// The nonce as lowercase hex, the form used in OpenID4VP requests.
    pub fn nonce_hex(&self) -> String {
        hex::encode(&self.nonce)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(cbor::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(cbor::from_slice(bytes)?)
    }
}

mod zeroizing_bytes {
    use serde::{Deserializer, Serializer};
    use zeroize::Zeroizing;

    pub fn serialize<S: Serializer>(bytes: &Zeroizing<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        serde_bytes::serialize(bytes.as_slice(), s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Zeroizing<Vec<u8>>, D::Error> {
        serde_bytes::deserialize::<Vec<u8>, D>(d).map(Zeroizing::new)
    }
}
