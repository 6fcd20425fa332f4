use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};

use crate::definitions::{
    helpers::{NonEmptyMap, NonEmptyVec},
    DeviceSigned, IssuerSigned,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Documents>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_errors: Option<DocumentErrors>,
    pub status: Status,
}

pub type Documents = NonEmptyVec<Document>;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub doc_type: String,
    pub issuer_signed: IssuerSigned,
    /// Absent from some remote presentations that carry no device data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_signed: Option<DeviceSigned>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Errors>,
}

/// Errors mapped by namespace and element identifier.
pub type Errors = NonEmptyMap<String, NonEmptyMap<String, DocumentErrorCode>>;
/// A list of document errors.
pub type DocumentErrors = NonEmptyVec<DocumentError>;
/// A map of document type to document error for them.
pub type DocumentError = BTreeMap<String, DocumentErrorCode>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "i128", into = "i128")]
pub enum DocumentErrorCode {
    DataNotReturned,
    ApplicationSpecific(i128),
}

impl From<i128> for DocumentErrorCode {
    fn from(value: i128) -> Self {
        match value {
            0 => DocumentErrorCode::DataNotReturned,
            _ => DocumentErrorCode::ApplicationSpecific(value),
        }
    }
}

impl From<DocumentErrorCode> for i128 {
    fn from(c: DocumentErrorCode) -> i128 {
        match c {
            DocumentErrorCode::DataNotReturned => 0,
            DocumentErrorCode::ApplicationSpecific(i) => i,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, EnumString, AsRefStr)]
#[serde(try_from = "u64", into = "u64")]
pub enum Status {
    OK,
    GeneralError,
    CborDecodingError,
    CborValidationError,
}

impl DeviceResponse {
    pub const VERSION: &'static str = "1.0";
}

impl From<Status> for u64 {
    fn from(s: Status) -> u64 {
        match s {
            Status::OK => 0,
            Status::GeneralError => 10,
            Status::CborDecodingError => 11,
            Status::CborValidationError => 12,
        }
    }
}

impl TryFrom<u64> for Status {
    type Error = String;

    fn try_from(n: u64) -> Result<Status, String> {
        match n {
            0 => Ok(Status::OK),
            10 => Ok(Status::GeneralError),
            11 => Ok(Status::CborDecodingError),
            12 => Ok(Status::CborValidationError),
            _ => Err(format!("unrecognised error code: {n}")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cbor;
    use ciborium::Value;

    #[test]
    fn status_codes() {
        let bytes = cbor::to_vec(&Status::CborDecodingError).unwrap();
        assert_eq!(bytes, [0x0b]);
        assert_eq!(cbor::from_slice::<Status>(&[0x00]).unwrap(), Status::OK);
        assert!(cbor::from_slice::<Status>(&[0x05]).is_err());
        assert_eq!(Status::GeneralError.as_ref(), "GeneralError");
    }

    #[test]
    fn response_without_documents() {
        let value = Value::Map(vec![
            (Value::Text("version".into()), Value::Text("1.0".into())),
            (
                Value::Text("documentErrors".into()),
                Value::Array(vec![Value::Map(vec![(
                    Value::Text("org.iso.18013.5.1.mDL".into()),
                    Value::Integer(0.into()),
                )])]),
            ),
            (Value::Text("status".into()), Value::Integer(0.into())),
        ]);
        let bytes = cbor::to_vec(&value).unwrap();
        let response: DeviceResponse = cbor::from_slice(&bytes).unwrap();
        assert!(response.documents.is_none());
        assert_eq!(
            response.document_errors.unwrap().first()["org.iso.18013.5.1.mDL"],
            DocumentErrorCode::DataNotReturned
        );
        assert_eq!(response.status, Status::OK);
    }
}
