//! Building and reading `DeviceRequest`s.
//!
//! A request is bound to its session through `ReaderAuthentication`, which embeds the
//! session transcript exactly as both parties encoded it:
//!
//! ```text
//! ReaderAuthentication = ["ReaderAuthentication", SessionTranscript, ItemsRequestBytes]
//! ReaderAuthenticationBytes = #6.24(bstr .cbor ReaderAuthentication)
//! ```
use ciborium::Value;

use super::Error;
use crate::cbor;
use crate::cose::CoseSign1;
use crate::definitions::device_request::{
    DataElementIdentifier, DeviceRequest, DocRequest, DocumentRequestSpec, ItemsRequest,
    ItemsRequestBytes, NameSpace, RequestInfo,
};
use crate::definitions::helpers::{NonEmptyMap, NonEmptyVec, Tag24};
use crate::definitions::x509::X5Chain;

pub const PAYMENT_DOC_TYPE: &str = "payment.auth.1";
pub const PAYMENT_NAMESPACE: &str = "payment.auth.1";

/// Transaction details attached to a payment authentication request.
///
/// Unset fields fall back to fixed demonstration values.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PaymentContext {
    pub merchant_name: Option<String>,
    pub transaction_amount: Option<String>,
    pub transaction_currency_code: Option<String>,
    pub payment_scheme: Option<String>,
    pub payment_type: Option<String>,
}

impl PaymentContext {
    const DEFAULT_MERCHANT_NAME: &'static str = "Unknown Merchant";
    const DEFAULT_TRANSACTION_AMOUNT: &'static str = "999";
    const DEFAULT_CURRENCY_CODE: &'static str = "USD";
    const DEFAULT_PAYMENT_SCHEME: &'static str = "V";
    const DEFAULT_PAYMENT_TYPE: &'static str = "C";
    const AUTH_NUMBER: &'static str = "4111112014267661";
    const AUTH_EXPIRY: &'static str = "09/27";

    /// The request info entries for a payment request. The scheme and type are only
    /// included when the request asks for `payment_scheme`.
    fn request_info(&self, namespaces: &NonEmptyMap<NameSpace, NonEmptyMap<DataElementIdentifier, bool>>) -> Vec<(String, Value)> {
        let text = |v: &Option<String>, default: &str| Value::Text(v.clone().unwrap_or_else(|| default.to_string()));
        let mut entries = vec![
            ("merchant_name".to_string(), text(&self.merchant_name, Self::DEFAULT_MERCHANT_NAME)),
            (
                "transaction_amount".to_string(),
                text(&self.transaction_amount, Self::DEFAULT_TRANSACTION_AMOUNT),
            ),
            (
                "transaction_currency_code".to_string(),
                text(&self.transaction_currency_code, Self::DEFAULT_CURRENCY_CODE),
            ),
        ];
        let wants_scheme = namespaces
            .get(PAYMENT_NAMESPACE)
            .map(|elements| elements.get("payment_scheme").is_some())
            .unwrap_or(false);
        if wants_scheme {
            entries.push((
                "payment_scheme".to_string(),
                text(&self.payment_scheme, Self::DEFAULT_PAYMENT_SCHEME),
            ));
            entries.push((
                "payment_type".to_string(),
                text(&self.payment_type, Self::DEFAULT_PAYMENT_TYPE),
            ));
        }
        entries.push(("payment_auth_number".to_string(), Value::Text(Self::AUTH_NUMBER.into())));
        entries.push(("payment_auth_expiry".to_string(), Value::Text(Self::AUTH_EXPIRY.into())));
        entries
    }
}

/// The key a request is signed with.
#[derive(Debug, Clone, Copy)]
pub enum ReaderSigningKey<'a> {
    Es256(&'a p256::ecdsa::SigningKey),
    Es384(&'a p384::ecdsa::SigningKey),
}

/// Reader authentication material: the signing key and its certificate chain.
#[derive(Debug, Clone, Copy)]
pub struct ReaderAuthKey<'a> {
    pub key: ReaderSigningKey<'a>,
    pub chain: Option<&'a X5Chain>,
}

/// Accumulates document requests into a `DeviceRequest` bound to one session transcript.
#[derive(Debug, Clone)]
pub struct DeviceRequestGenerator {
    session_transcript: Vec<u8>,
    doc_requests: Vec<DocRequest>,
}

impl DeviceRequestGenerator {
    pub fn new(session_transcript: impl Into<Vec<u8>>) -> Self {
        Self {
            session_transcript: session_transcript.into(),
            doc_requests: Vec::new(),
        }
    }

    /// Add a request for one document.
    ///
    /// `request_info` values must each be a single encoded CBOR data item. Payment
    /// requests get their transaction details appended from `payment`.
    pub fn add_document_request(
        &mut self,
        request: &DocumentRequestSpec,
        request_info: Option<&[(String, Vec<u8>)]>,
        reader_auth: Option<ReaderAuthKey<'_>>,
        payment: Option<&PaymentContext>,
    ) -> Result<&mut Self, Error> {
        if let Some(ReaderAuthKey { chain: None, .. }) = reader_auth {
            return Err(Error::MissingReaderCertificateChain);
        }

        let mut info: Vec<(String, Value)> = Vec::new();
        for (key, bytes) in request_info.unwrap_or_default() {
            let value: Value =
                cbor::from_slice(bytes).map_err(|_| Error::InvalidRequestInfo(key.clone()))?;
            info.push((key.clone(), value));
        }
        if request.doc_type == PAYMENT_DOC_TYPE {
            let context = payment.cloned().unwrap_or_default();
            for (key, value) in context.request_info(&request.namespaces) {
                match info.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, existing)) => *existing = value,
                    None => info.push((key, value)),
                }
            }
        }
        let request_info = if info.is_empty() {
            None
        } else {
            Some(RequestInfo::try_from(info).map_err(|_| Error::UnexpectedType("request info"))?)
        };

        let items_request = Tag24::new(ItemsRequest {
            doc_type: request.doc_type.clone(),
            namespaces: request.namespaces.clone(),
            request_info,
        })?;

        let reader_auth = match reader_auth {
            Some(ReaderAuthKey {
                key,
                chain: Some(chain),
            }) => {
                let payload = reader_authentication_bytes(&self.session_transcript, &items_request)?;
                Some(match key {
                    ReaderSigningKey::Es256(key) => {
                        CoseSign1::sign_detached::<_, p256::ecdsa::Signature>(key, &payload, chain)?
                    }
                    ReaderSigningKey::Es384(key) => {
                        CoseSign1::sign_detached::<_, p384::ecdsa::Signature>(key, &payload, chain)?
                    }
                })
            }
            _ => None,
        };

        self.doc_requests.push(DocRequest {
            items_request,
            reader_auth,
        });
        Ok(self)
    }

    /// Encode `{"version": "1.0", "docRequests": [...]}`.
    pub fn generate(&self) -> Result<Vec<u8>, Error> {
        let doc_requests = NonEmptyVec::try_from(self.doc_requests.clone())
            .map_err(|_| Error::MissingField("docRequests"))?;
        let request = DeviceRequest {
            version: DeviceRequest::VERSION.to_string(),
            doc_requests,
        };
        let bytes = cbor::to_vec(&request)?;
        tracing::debug!("DeviceRequest: {}", hex::encode(&bytes));
        Ok(bytes)
    }
}

/// Encode `ReaderAuthenticationBytes` for the given transcript and items request.
pub fn reader_authentication_bytes(
    session_transcript: &[u8],
    items_request: &ItemsRequestBytes,
) -> Result<Vec<u8>, Error> {
    let authentication = cbor::array_of_encoded(&[
        &cbor::to_vec(&"ReaderAuthentication")?,
        session_transcript,
        &items_request.to_tagged_bytes()?,
    ]);
    Ok(cbor::to_vec(&Value::Tag(24, Box::new(Value::Bytes(authentication))))?)
}

/// A document request read back from a `DeviceRequest`.
#[derive(Debug, Clone)]
pub struct ParsedDocRequest {
    pub items_request: ItemsRequest,
    pub reader_cert_chain: Option<X5Chain>,
    pub reader_authenticated: bool,
}

impl ParsedDocRequest {
    pub fn doc_type(&self) -> &str {
        &self.items_request.doc_type
    }

    pub fn namespaces(&self) -> Vec<&str> {
        self.items_request
            .namespaces
            .keys()
            .map(NameSpace::as_str)
            .collect()
    }

    pub fn entry_names(&self, namespace: &str) -> Result<Vec<&str>, Error> {
        Ok(self
            .elements(namespace)?
            .keys()
            .map(DataElementIdentifier::as_str)
            .collect())
    }

    pub fn intent_to_retain(&self, namespace: &str, element: &str) -> Result<bool, Error> {
        self.elements(namespace)?
            .get(element)
            .copied()
            .ok_or_else(|| Error::UnknownDataElement {
                namespace: namespace.to_string(),
                element: element.to_string(),
            })
    }

    /// Request info entries, each as its encoded CBOR data item.
    pub fn request_info(&self) -> Result<Vec<(String, Vec<u8>)>, Error> {
        match &self.items_request.request_info {
            None => Ok(Vec::new()),
            Some(info) => info
                .iter()
                .map(|(k, v)| Ok((k.clone(), cbor::to_vec(v)?)))
                .collect(),
        }
    }

    fn elements(
        &self,
        namespace: &str,
    ) -> Result<&NonEmptyMap<DataElementIdentifier, bool>, Error> {
        self.items_request
            .namespaces
            .get(namespace)
            .ok_or_else(|| Error::UnknownNamespace(namespace.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ParsedDeviceRequest {
    pub version: String,
    pub doc_requests: Vec<ParsedDocRequest>,
}

/// Reads a `DeviceRequest` and checks each reader signature against the session transcript.
pub struct DeviceRequestParser;

impl DeviceRequestParser {
    pub fn parse(bytes: &[u8], session_transcript: &[u8]) -> Result<ParsedDeviceRequest, Error> {
        let request: DeviceRequest = cbor::from_slice(bytes)?;
        if !request.version.starts_with("1.") {
            return Err(Error::UnsupportedVersion(request.version));
        }

        let doc_requests = request
            .doc_requests
            .into_inner()
            .into_iter()
            .map(|doc_request| {
                let (reader_cert_chain, reader_authenticated) = match &doc_request.reader_auth {
                    None => (None, false),
                    Some(reader_auth) => {
                        let chain = reader_auth.x5chain()?;
                        let payload = reader_authentication_bytes(
                            session_transcript,
                            &doc_request.items_request,
                        )?;
                        let verified = match reader_auth.verify_with_x5chain(Some(&payload)) {
                            Ok(()) => true,
                            Err(e) => {
                                tracing::warn!(
                                    "reader signature from '{}' did not verify: {e}",
                                    chain.end_entity_common_name()
                                );
                                false
                            }
                        };
                        (Some(chain), verified)
                    }
                };
                Ok(ParsedDocRequest {
                    items_request: doc_request.items_request.into_inner(),
                    reader_cert_chain,
                    reader_authenticated,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(ParsedDeviceRequest {
            version: request.version,
            doc_requests,
        })
    }
}
