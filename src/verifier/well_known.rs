//! Canned requests, looked up by format, document type and request id.
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};

use crate::definitions::device_request::{DocumentRequestSpec, Error};

pub const MDL_DOCTYPE: &str = "org.iso.18013.5.1.mDL";
pub const MDL_NAMESPACE: &str = "org.iso.18013.5.1";
pub const EUPID_DOCTYPE: &str = "eu.europa.ec.eudi.pid.1";
pub const EUPID_NAMESPACE: &str = "eu.europa.ec.eudi.pid.1";
pub const EUPID_VCT: &str = "urn:eu.europa.ec.eudi:pid:1";
pub const PAYMENT_DOCTYPE: &str = crate::presentation::reader::request::PAYMENT_DOC_TYPE;
pub const PAYMENT_NAMESPACE: &str = crate::presentation::reader::request::PAYMENT_NAMESPACE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CredentialFormat {
    Mdoc,
    Vc,
}

/// Claims requested from an SD-JWT VC.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcRequestSpec {
    pub vct: String,
    pub claims: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum CredentialRequest {
    #[serde(rename = "mdoc")]
    Mdoc {
        request_id: String,
        spec: DocumentRequestSpec,
    },
    #[serde(rename = "vc")]
    Vc {
        request_id: String,
        spec: VcRequestSpec,
    },
}

impl CredentialRequest {
    pub fn format(&self) -> CredentialFormat {
        match self {
            CredentialRequest::Mdoc { .. } => CredentialFormat::Mdoc,
            CredentialRequest::Vc { .. } => CredentialFormat::Vc,
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            CredentialRequest::Mdoc { request_id, .. } | CredentialRequest::Vc { request_id, .. } => {
                request_id
            }
        }
    }

    /// The mdoc document type or the VC type.
    pub fn doc_type(&self) -> &str {
        match self {
            CredentialRequest::Mdoc { spec, .. } => &spec.doc_type,
            CredentialRequest::Vc { spec, .. } => &spec.vct,
        }
    }
}

const MDL_MANDATORY: &[&str] = &[
    "family_name",
    "given_name",
    "birth_date",
    "issue_date",
    "expiry_date",
    "issuing_country",
    "issuing_authority",
    "document_number",
    "portrait",
    "driving_privileges",
    "un_distinguishing_sign",
];

const MDL_OPTIONAL: &[&str] = &[
    "administrative_number",
    "sex",
    "height",
    "weight",
    "eye_colour",
    "hair_colour",
    "birth_place",
    "resident_address",
    "portrait_capture_date",
    "age_in_years",
    "age_birth_year",
    "age_over_18",
    "age_over_21",
    "issuing_jurisdiction",
    "nationality",
    "resident_city",
    "resident_state",
    "resident_postal_code",
    "resident_country",
    "family_name_national_character",
    "given_name_national_character",
    "signature_usual_mark",
];

const EUPID_MANDATORY: &[&str] = &[
    "family_name",
    "given_name",
    "birth_date",
    "age_over_18",
    "issuance_date",
    "expiry_date",
    "issuing_authority",
    "issuing_country",
];

const EUPID_ALL: &[&str] = &[
    "family_name",
    "given_name",
    "birth_date",
    "birth_place",
    "nationality",
    "resident_address",
    "resident_country",
    "resident_state",
    "resident_city",
    "resident_postal_code",
    "resident_street",
    "resident_house_number",
    "personal_administrative_number",
    "portrait",
    "portrait_capture_date",
    "family_name_birth",
    "given_name_birth",
    "sex",
    "email_address",
    "mobile_phone_number",
    "expiry_date",
    "issuing_authority",
    "issuing_country",
    "document_number",
    "issuance_date",
    "age_over_18",
    "age_in_years",
    "age_birth_year",
];

fn mdoc(
    request_id: &str,
    doc_type: &str,
    namespace: &str,
    elements: &[&[&str]],
) -> Result<CredentialRequest, Error> {
    let entries = elements
        .iter()
        .flat_map(|group| group.iter())
        .map(|element| (namespace, *element, false));
    Ok(CredentialRequest::Mdoc {
        request_id: request_id.to_string(),
        spec: DocumentRequestSpec::from_entries(doc_type, entries)?,
    })
}

fn vc(request_id: &str, vct: &str, claims: &[&str]) -> CredentialRequest {
    CredentialRequest::Vc {
        request_id: request_id.to_string(),
        spec: VcRequestSpec {
            vct: vct.to_string(),
            claims: claims.iter().map(|c| c.to_string()).collect(),
        },
    }
}

/// Look up a canned request. Returns `None` for unknown combinations.
pub fn lookup(
    format: CredentialFormat,
    doc_type: &str,
    request_id: &str,
) -> Option<CredentialRequest> {
    let request = match (format, doc_type, request_id) {
        (CredentialFormat::Mdoc, MDL_DOCTYPE, "age_over_18") => {
            mdoc(request_id, MDL_DOCTYPE, MDL_NAMESPACE, &[&["age_over_18", "portrait"]])
        }
        (CredentialFormat::Mdoc, MDL_DOCTYPE, "mandatory") => {
            mdoc(request_id, MDL_DOCTYPE, MDL_NAMESPACE, &[MDL_MANDATORY])
        }
        (CredentialFormat::Mdoc, MDL_DOCTYPE, "full") => {
            mdoc(request_id, MDL_DOCTYPE, MDL_NAMESPACE, &[MDL_MANDATORY, MDL_OPTIONAL])
        }
        (CredentialFormat::Mdoc, EUPID_DOCTYPE, "mandatory") => {
            mdoc(request_id, EUPID_DOCTYPE, EUPID_NAMESPACE, &[EUPID_MANDATORY])
        }
        (CredentialFormat::Mdoc, EUPID_DOCTYPE, "full") => {
            mdoc(request_id, EUPID_DOCTYPE, EUPID_NAMESPACE, &[EUPID_ALL])
        }
        (CredentialFormat::Mdoc, PAYMENT_DOCTYPE, "SCA") => mdoc(
            request_id,
            PAYMENT_DOCTYPE,
            PAYMENT_NAMESPACE,
            &[&["payment_auth_number"]],
        ),
        (CredentialFormat::Vc, EUPID_VCT, "mandatory") => Ok(vc(request_id, EUPID_VCT, EUPID_MANDATORY)),
        (CredentialFormat::Vc, EUPID_VCT, "full") => Ok(vc(request_id, EUPID_VCT, EUPID_ALL)),
        _ => return None,
    };
    match request {
        Ok(request) => Some(request),
        Err(e) => {
            tracing::error!("canned request {doc_type}/{request_id} is invalid: {e}");
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canned_requests() {
        let request = lookup(CredentialFormat::Mdoc, MDL_DOCTYPE, "age_over_18").unwrap();
        assert_eq!(request.format(), CredentialFormat::Mdoc);
        assert_eq!(request.doc_type(), MDL_DOCTYPE);
        assert_eq!(request.request_id(), "age_over_18");
        let CredentialRequest::Mdoc { spec, .. } = &request else {
            panic!("expected an mdoc request");
        };
        let elements: Vec<&str> = spec.entries().map(|(_, el, _)| el.as_str()).collect();
        assert_eq!(elements, ["age_over_18", "portrait"]);

        let full = lookup(CredentialFormat::Mdoc, MDL_DOCTYPE, "full").unwrap();
        let CredentialRequest::Mdoc { spec, .. } = &full else {
            panic!("expected an mdoc request");
        };
        assert_eq!(
            spec.entries().count(),
            MDL_MANDATORY.len() + MDL_OPTIONAL.len()
        );

        let pid = lookup(CredentialFormat::Vc, EUPID_VCT, "mandatory").unwrap();
        assert_eq!(pid.doc_type(), EUPID_VCT);
        assert!(lookup(CredentialFormat::Mdoc, PAYMENT_DOCTYPE, "SCA").is_some());
        assert!(lookup(CredentialFormat::Vc, MDL_DOCTYPE, "full").is_none());
    }

    #[test]
    fn formats() {
        assert_eq!("mdoc".parse::<CredentialFormat>().unwrap(), CredentialFormat::Mdoc);
        assert_eq!(CredentialFormat::Vc.as_ref(), "vc");
    }
}
