//! Reader (verifier) side of mdoc and SD-JWT presentations.
//!
//! [`request::DeviceRequestGenerator`] produces the `DeviceRequest` sent to the holder,
//! [`response::DeviceResponseValidator`] parses what comes back, and [`mdoc_auth`]
//! offers the issuer and device authentication checks over a parsed document.
pub mod mdoc_auth;
pub mod request;
pub mod response;
pub mod sd_jwt;

pub use request::{
    DeviceRequestGenerator, DeviceRequestParser, ParsedDeviceRequest, ParsedDocRequest,
    PaymentContext, ReaderAuthKey, ReaderSigningKey,
};
pub use response::{DeviceResponseValidator, ResponseDocument, ValidatedDeviceResponse};

use crate::cbor::CborError;
use crate::cose::sign1;
use crate::definitions::{device_key::cose_key, device_request, helpers::tag24};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("CBOR error: {0}")]
    Cbor(#[from] CborError),
    #[error("tagged data item error: {0}")]
    Tag24(#[from] tag24::Error),
    #[error("COSE_Sign1 error: {0}")]
    Cose(#[from] sign1::Error),
    #[error("COSE_Key error: {0}")]
    CoseKey(#[from] cose_key::Error),
    #[error("invalid request: {0}")]
    Request(#[from] device_request::Error),
    #[error("a reader key was provided without its certificate chain")]
    MissingReaderCertificateChain,
    #[error("request info value for '{0}' is not valid CBOR")]
    InvalidRequestInfo(String),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("unexpected CBOR type for {0}")]
    UnexpectedType(&'static str),
    #[error("unsupported version '{0}'")]
    UnsupportedVersion(String),
    #[error("no namespace '{0}' in the document")]
    UnknownNamespace(String),
    #[error("no data element '{element}' in namespace '{namespace}'")]
    UnknownDataElement { namespace: String, element: String },
    #[error("failed mdoc authentication: {0}")]
    MdocAuth(String),
    #[error("invalid SD-JWT presentation: {0}")]
    SdJwt(String),
    #[error(transparent)]
    Crypto(#[from] crate::crypto::Error),
}
