//! Parsing of `DeviceResponse`s returned by a holder.
use ciborium::Value;

use super::Error;
use crate::cbor;
use crate::definitions::device_response::Status;
use crate::definitions::issuer_signed::IssuerSignedItem;
use crate::definitions::x509::X5Chain;
use crate::definitions::{DeviceResponse, Document};

/// A structurally valid `DeviceResponse`.
#[derive(Debug, Clone)]
pub struct ValidatedDeviceResponse {
    pub version: String,
    pub status: Status,
    pub documents: Vec<ResponseDocument>,
}

/// One returned document, kept together with the session transcript it was presented
/// over.
#[derive(Debug, Clone)]
pub struct ResponseDocument {
    document: Document,
    session_transcript: Vec<u8>,
}

pub struct DeviceResponseValidator;

impl DeviceResponseValidator {
    /// Parse `raw` and check the fields every response must carry.
    ///
    /// No signature is checked here; see [`super::mdoc_auth`].
    pub fn parse(raw: &[u8], session_transcript: &[u8]) -> Result<ValidatedDeviceResponse, Error> {
        let value: Value = cbor::from_slice(raw)?;
        check_required_fields(&value)?;

        let response: DeviceResponse = cbor::from_value(value)?;
        if response.version.split('.').next() != Some("1") {
            return Err(Error::UnsupportedVersion(response.version));
        }
        if response.status != Status::OK {
            tracing::warn!("device response status: {}", response.status.as_ref());
        }

        let documents = response
            .documents
            .map(|documents| documents.into_inner())
            .unwrap_or_default()
            .into_iter()
            .map(|document| ResponseDocument {
                document,
                session_transcript: session_transcript.to_vec(),
            })
            .collect();

        Ok(ValidatedDeviceResponse {
            version: response.version,
            status: response.status,
            documents,
        })
    }
}

fn check_required_fields(value: &Value) -> Result<(), Error> {
    let Value::Map(response) = value else {
        return Err(Error::UnexpectedType("DeviceResponse"));
    };
    for field in ["version", "status"] {
        cbor::map_get(response, field).ok_or(Error::MissingField(field))?;
    }
    let documents = match cbor::map_get(response, "documents") {
        None => return Ok(()),
        Some(Value::Array(documents)) => documents,
        Some(_) => return Err(Error::UnexpectedType("documents")),
    };
    for document in documents {
        let Value::Map(document) = document else {
            return Err(Error::UnexpectedType("Document"));
        };
        cbor::map_get(document, "docType").ok_or(Error::MissingField("docType"))?;
        match cbor::map_get(document, "issuerSigned") {
            None => return Err(Error::MissingField("issuerSigned")),
            Some(Value::Map(issuer_signed)) => {
                cbor::map_get(issuer_signed, "issuerAuth")
                    .ok_or(Error::MissingField("issuerAuth"))?;
            }
            Some(_) => return Err(Error::UnexpectedType("issuerSigned")),
        }
    }
    Ok(())
}

impl ResponseDocument {
    pub fn doc_type(&self) -> &str {
        &self.document.doc_type
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn session_transcript(&self) -> &[u8] {
        &self.session_transcript
    }

    /// Namespaces with issuer-signed elements, in the order received.
    pub fn issuer_namespaces(&self) -> Vec<&str> {
        self.document
            .issuer_signed
            .namespaces
            .as_ref()
            .map(|namespaces| namespaces.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn issuer_entry_names(&self, namespace: &str) -> Result<Vec<&str>, Error> {
        Ok(self
            .items(namespace)?
            .map(|item| item.element_identifier.as_str())
            .collect())
    }

    /// The encoded CBOR value of an issuer-signed element.
    pub fn issuer_entry_data(&self, namespace: &str, element: &str) -> Result<Vec<u8>, Error> {
        let item = self
            .items(namespace)?
            .find(|item| item.element_identifier == element)
            .ok_or_else(|| Error::UnknownDataElement {
                namespace: namespace.to_string(),
                element: element.to_string(),
            })?;
        Ok(cbor::to_vec(&item.element_value)?)
    }

    /// The certificate chain of the document signer, from the `issuerAuth` headers.
    pub fn issuer_cert_chain(&self) -> Result<X5Chain, Error> {
        Ok(self.document.issuer_signed.issuer_auth.x5chain()?)
    }

    fn items(&self, namespace: &str) -> Result<impl Iterator<Item = &IssuerSignedItem>, Error> {
        let items = self
            .document
            .issuer_signed
            .namespaces
            .as_ref()
            .and_then(|namespaces| namespaces.get(namespace))
            .ok_or_else(|| Error::UnknownNamespace(namespace.to_string()))?;
        Ok(items.iter().map(|item| item.as_ref()))
    }
}
