//! Issuer data authentication and mdoc authentication of a returned document.
//!
//! These checks are offered to callers; parsing a response does not run them.
use time::OffsetDateTime;

use super::{Error, ResponseDocument};
use crate::cbor;
use crate::definitions::device_signed::device_authentication_bytes;
use crate::definitions::helpers::Tag24;
use crate::definitions::{DeviceAuth, Mso};

/// Verify `issuerAuth` with the end-entity key of its x5chain and return the signed MSO.
pub fn issuer_authentication(document: &ResponseDocument) -> Result<Mso, Error> {
    let issuer_auth = &document.document().issuer_signed.issuer_auth;
    issuer_auth
        .verify_with_x5chain(None)
        .map_err(|e| Error::MdocAuth(format!("issuer signature: {e}")))?;
    let payload = issuer_auth
        .payload()
        .ok_or(Error::MdocAuth("issuerAuth has no payload".into()))?;
    let mso: Tag24<Mso> = cbor::from_slice(payload)?;
    Ok(mso.into_inner())
}

/// Recompute the digest of every issuer-signed element and compare it with the MSO.
pub fn verify_digests(document: &ResponseDocument, mso: &Mso) -> Result<(), Error> {
    if mso.doc_type != document.doc_type() {
        return Err(Error::MdocAuth(format!(
            "MSO is for '{}', document is '{}'",
            mso.doc_type,
            document.doc_type()
        )));
    }
    let Some(namespaces) = &document.document().issuer_signed.namespaces else {
        return Ok(());
    };
    for (namespace, items) in namespaces.iter() {
        let digests = mso
            .value_digests
            .get(namespace)
            .ok_or_else(|| Error::MdocAuth(format!("no digests for namespace '{namespace}'")))?;
        for item in items.iter() {
            let digest_id = item.as_ref().digest_id;
            let expected = digests.get(&digest_id).ok_or_else(|| {
                Error::MdocAuth(format!("no digest {digest_id} in namespace '{namespace}'"))
            })?;
            let actual = mso.digest_algorithm.digest(&item.to_tagged_bytes()?);
            if actual != expected.as_ref() {
                return Err(Error::MdocAuth(format!(
                    "digest mismatch for '{namespace}/{}'",
                    item.as_ref().element_identifier
                )));
            }
        }
    }
    Ok(())
}

/// Check the MSO validity window.
pub fn verify_validity(mso: &Mso, now: OffsetDateTime) -> Result<(), Error> {
    if mso.validity_info.is_valid_at(now) {
        Ok(())
    } else {
        Err(Error::MdocAuth("MSO is outside its validity period".into()))
    }
}

/// Verify the device signature over `DeviceAuthentication` bound to `session_transcript`.
pub fn device_authentication(
    document: &ResponseDocument,
    mso: &Mso,
    session_transcript: &[u8],
) -> Result<(), Error> {
    let device_signed = document
        .document()
        .device_signed
        .as_ref()
        .ok_or(Error::MissingField("deviceSigned"))?;
    let DeviceAuth::DeviceSignature(signature) = &device_signed.device_auth else {
        return Err(Error::MdocAuth(
            "only device signatures can be verified".into(),
        ));
    };

    let device_key = mso.device_key_info.device_key.to_p256()?;
    let payload =
        device_authentication_bytes(session_transcript, document.doc_type(), &device_signed.namespaces)?;
    signature
        .verify_detached::<_, p256::ecdsa::Signature>(
            &p256::ecdsa::VerifyingKey::from(&device_key),
            &payload,
        )
        .map_err(|e| Error::MdocAuth(format!("device signature: {e}")))
}
