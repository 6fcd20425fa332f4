use strum_macros::IntoStaticStr;

use super::storage::StorageError;
use crate::cbor::CborError;
use crate::presentation::reader;

/// Failures of a verifier session operation.
#[derive(Debug, thiserror::Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Error {
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),
    #[error("no session with id '{0}'")]
    MissingSession(String),
    #[error("session is in state {actual}, expected {expected}")]
    WrongState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("unable to decrypt the response: {0}")]
    DecryptFailure(String),
    #[error("invalid signature: {0}")]
    SignatureInvalid(String),
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),
    #[error("missing field '{0}'")]
    MissingField(String),
    #[error("{0}")]
    UnknownNamespaceOrElement(String),
    #[error("session storage: {0}")]
    Storage(#[from] StorageError),
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("crypto worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl Error {
    /// A stable identifier of the failure, e.g. `missing_session`.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

impl From<CborError> for Error {
    fn from(e: CborError) -> Self {
        Error::MalformedEncoding(e.to_string())
    }
}

impl From<crate::crypto::Error> for Error {
    fn from(e: crate::crypto::Error) -> Self {
        use crate::crypto::Error as Crypto;
        match e {
            Crypto::Decryption | Crypto::KeyDerivation => Error::DecryptFailure(e.to_string()),
            Crypto::SignatureInvalid => Error::SignatureInvalid(e.to_string()),
            Crypto::Encryption | Crypto::Signing(_) => Error::Configuration(e.to_string()),
            _ => Error::MalformedEncoding(e.to_string()),
        }
    }
}

impl From<reader::Error> for Error {
    fn from(e: reader::Error) -> Self {
        match e {
            reader::Error::MissingField(field) => Error::MissingField(field.to_string()),
            reader::Error::UnknownNamespace(_) | reader::Error::UnknownDataElement { .. } => {
                Error::UnknownNamespaceOrElement(e.to_string())
            }
            reader::Error::MdocAuth(_) => Error::SignatureInvalid(e.to_string()),
            reader::Error::MissingReaderCertificateChain => Error::Configuration(e.to_string()),
            reader::Error::Crypto(e) => e.into(),
            _ => Error::MalformedEncoding(e.to_string()),
        }
    }
}
