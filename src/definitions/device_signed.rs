//! Device-signed data of a returned document and the `DeviceAuthentication` structure the
//! device signature covers.
use std::collections::BTreeMap;

use ciborium::Value as CborValue;
use serde::{Deserialize, Serialize};

use crate::cbor::{self, CborError};
use crate::cose::CoseSign1;
use crate::definitions::helpers::{NonEmptyMap, Tag24};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSigned {
    #[serde(rename = "nameSpaces")]
    pub namespaces: DeviceNamespacesBytes,
    pub device_auth: DeviceAuth,
}

pub type DeviceNamespacesBytes = Tag24<DeviceNamespaces>;
pub type DeviceNamespaces = BTreeMap<String, DeviceSignedItems>;
pub type DeviceSignedItems = NonEmptyMap<String, CborValue>;

/// Either a signature or a MAC by the device key. Only the signature form can be checked
/// by a verifier that never performed a key agreement with the device, so the MAC is kept
/// as an opaque COSE structure.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceAuth {
    DeviceSignature(CoseSign1),
    DeviceMac(CborValue),
}

/// Encode `DeviceAuthenticationBytes = #6.24(bstr .cbor ["DeviceAuthentication",
/// SessionTranscript, DocType, DeviceNameSpacesBytes])`.
///
/// The transcript is embedded exactly as given.
pub fn device_authentication_bytes(
    session_transcript: &[u8],
    doc_type: &str,
    namespaces: &DeviceNamespacesBytes,
) -> Result<Vec<u8>, CborError> {
    let namespaces = namespaces
        .to_tagged_bytes()
        .map_err(|_| CborError::EncodeFailed)?;
    let authentication = cbor::array_of_encoded(&[
        &cbor::to_vec(&"DeviceAuthentication")?,
        session_transcript,
        &cbor::to_vec(&doc_type)?,
        &namespaces,
    ]);
    cbor::to_vec(&CborValue::Tag(24, Box::new(CborValue::Bytes(authentication))))
}
