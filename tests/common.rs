use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ciborium::Value;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde_json::json;
use time::OffsetDateTime;

use isomdl_verifier::cbor;
use isomdl_verifier::cose::CoseSign1;
use isomdl_verifier::crypto::{hpke, jwe};
use isomdl_verifier::definitions::device_response::{Documents, Status};
use isomdl_verifier::definitions::device_signed::{device_authentication_bytes, DeviceNamespaces};
use isomdl_verifier::definitions::helpers::{ByteStr, NonEmptyMap, NonEmptyVec, Tag24};
use isomdl_verifier::definitions::x509::issue::{self_signed_certificate, CertificateParams};
use isomdl_verifier::definitions::x509::X5Chain;
use isomdl_verifier::definitions::{
    ArfEncryptionInfo, CoseKey, DeviceAuth, DeviceKeyInfo, DeviceResponse, DeviceSigned,
    DigestAlgorithm, Document, IssuerSigned, IssuerSignedItem, Mso, SessionTranscript,
    ValidityInfo,
};
use isomdl_verifier::verifier::{
    MemorySessionStore, ReaderRoot, VerifierConfig, VerifierSession, VerifierSessionCoordinator,
};

#[allow(dead_code)]
pub const ORIGIN: &str = "https://verifier.example";
#[allow(dead_code)]
pub const DOC_TYPE: &str = "org.iso.18013.5.1.mDL";
#[allow(dead_code)]
pub const NAMESPACE: &str = "org.iso.18013.5.1";

#[allow(dead_code)]
fn main() {}

#[allow(dead_code)]
pub fn coordinator() -> Result<VerifierSessionCoordinator> {
    Ok(VerifierSessionCoordinator::new(
        VerifierConfig::new(ORIGIN)?,
        Arc::new(MemorySessionStore::new()),
        Arc::new(ReaderRoot::generate()?),
    ))
}

/// A document signer with a self-signed certificate valid around now.
#[allow(dead_code)]
pub fn document_signer(subject: &str) -> Result<(SigningKey, X5Chain)> {
    let key = SigningKey::random(&mut rand::thread_rng());
    let certificate = self_signed_certificate(
        &CertificateParams::around_now(subject, Duration::from_secs(600), Duration::from_secs(3600)),
        &key,
    )?;
    let chain = X5Chain::builder().with_certificate(certificate)?.build()?;
    Ok((key, chain))
}

/// Issue an mDL carrying `elements` and present it over `transcript` as an encoded
/// `DeviceResponse`.
#[allow(dead_code)]
pub fn present_mdl(elements: &[(&str, Value)], transcript: &[u8]) -> Result<Vec<u8>> {
    let (issuer_key, issuer_chain) = document_signer("CN=Integration Test Document Signer,C=US")?;
    let device_key = SigningKey::random(&mut rand::thread_rng());

    let mut items = Vec::new();
    let mut digests = BTreeMap::new();
    for (i, (element, value)) in elements.iter().enumerate() {
        let item = Tag24::new(IssuerSignedItem {
            digest_id: i as u64,
            random: ByteStr::from(vec![0x42; 16]),
            element_identifier: element.to_string(),
            element_value: value.clone(),
        })?;
        digests.insert(
            i as u64,
            ByteStr::from(DigestAlgorithm::SHA256.digest(&item.to_tagged_bytes()?)),
        );
        items.push(item);
    }

    let now = OffsetDateTime::now_utc();
    let mso = Mso {
        version: "1.0".into(),
        digest_algorithm: DigestAlgorithm::SHA256,
        value_digests: BTreeMap::from([(NAMESPACE.to_string(), digests)]),
        device_key_info: DeviceKeyInfo {
            device_key: CoseKey::from(&p256::PublicKey::from(device_key.verifying_key())),
            key_authorizations: None,
            key_info: None,
        },
        doc_type: DOC_TYPE.into(),
        validity_info: ValidityInfo {
            signed: now,
            valid_from: now,
            valid_until: now + Duration::from_secs(3600),
            expected_update: None,
        },
    };
    let issuer_auth = CoseSign1::sign_attached::<_, p256::ecdsa::Signature>(
        &issuer_key,
        Tag24::new(mso)?.to_tagged_bytes()?,
        &issuer_chain,
    )?;

    let device_namespaces = Tag24::new(DeviceNamespaces::new())?;
    let device_signature = CoseSign1::sign_detached::<_, p256::ecdsa::Signature>(
        &device_key,
        &device_authentication_bytes(transcript, DOC_TYPE, &device_namespaces)?,
        &issuer_chain,
    )?;

    let items = NonEmptyVec::try_from(items).map_err(|_| anyhow::anyhow!("no elements"))?;
    let document = Document {
        doc_type: DOC_TYPE.into(),
        issuer_signed: IssuerSigned {
            namespaces: Some(NonEmptyMap::new(NAMESPACE.to_string(), items)),
            issuer_auth,
        },
        device_signed: Some(DeviceSigned {
            namespaces: device_namespaces,
            device_auth: DeviceAuth::DeviceSignature(device_signature),
        }),
        errors: None,
    };
    let response = DeviceResponse {
        version: DeviceResponse::VERSION.into(),
        documents: Some(Documents::new(document)),
        document_errors: None,
        status: Status::OK,
    };
    cbor::to_vec(&response).context("could not encode the device response")
}

/// Seal `response` the way an Android wallet answers a preview request.
#[allow(dead_code)]
pub fn wallet_preview_response(session: &VerifierSession, response: &[u8]) -> Result<String> {
    let reader = session.encryption_key()?.public_key();
    let transcript =
        SessionTranscript::dc_preview(&session.nonce, &session.origin, &reader)?.to_bytes()?;
    let sealed = hpke::seal(&reader, &[], &transcript, response)?;
    let token = Value::Map(vec![
        (Value::Text("version".into()), Value::Text("ANDROID-HPKE-v1".into())),
        (
            Value::Text("encryptionParameters".into()),
            Value::Map(vec![(Value::Text("pkEm".into()), Value::Bytes(sealed.enc))]),
        ),
        (Value::Text("cipherText".into()), Value::Bytes(sealed.ciphertext)),
    ]);
    Ok(json!({ "token": b64url(cbor::to_vec(&token)?) }).to_string())
}

/// Seal `response` the way an ARF wallet answers.
#[allow(dead_code)]
pub fn wallet_arf_response(session: &VerifierSession, response: &[u8]) -> Result<String> {
    let reader = session.encryption_key()?.public_key();
    let info = ArfEncryptionInfo::new(&session.nonce, &reader);
    let transcript = SessionTranscript::dc_arf(&info, &session.origin)?.to_bytes()?;
    let sealed = hpke::seal(&reader, &[], &transcript, response)?;
    let encapsulated = p256::PublicKey::from_sec1_bytes(&sealed.enc)?;
    let envelope = Value::Array(vec![
        Value::Text("ARFencryptionv2".into()),
        Value::Map(vec![
            (Value::Text("pkEM".into()), CoseKey::from(&encapsulated).into()),
            (Value::Text("cipherText".into()), Value::Bytes(sealed.ciphertext)),
        ]),
    ]);
    Ok(json!({ "encryptedResponse": b64url(cbor::to_vec(&envelope)?) }).to_string())
}

/// Encrypt a `vp_token` to the session key as a `direct_post.jwt` form body.
#[allow(dead_code)]
pub fn wallet_openid4vp_response(
    session: &VerifierSession,
    vp_token: &str,
    apu: Option<&str>,
    apv: Option<&str>,
) -> Result<String> {
    let recipient = session.encryption_key()?.public_key();
    let claims = serde_json::to_vec(&json!({ "vp_token": vp_token }))?;
    Ok(format!("response={}", jwe::encrypt(&claims, &recipient, apu, apv)?))
}

#[allow(dead_code)]
pub fn b64url(bytes: impl AsRef<[u8]>) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

#[allow(dead_code)]
pub fn uncompressed(key: &p256::PublicKey) -> Vec<u8> {
    key.to_encoded_point(false).as_bytes().to_vec()
}
