mod common;

use std::sync::Arc;

use anyhow::{Context, Result};

use isomdl_verifier::cbor;
use isomdl_verifier::definitions::x509::{TrustManager, TrustPoint};
use isomdl_verifier::definitions::{ArfEncryptionInfo, SessionTranscript};
use isomdl_verifier::definitions::device_request::DocumentRequestSpec;
use isomdl_verifier::presentation::reader::{
    self, DeviceRequestGenerator, DeviceRequestParser, PaymentContext, ReaderAuthKey,
    ReaderSigningKey,
};
use isomdl_verifier::verifier::well_known::{self, CredentialFormat, PAYMENT_DOCTYPE};
use isomdl_verifier::verifier::{
    BeginOptions, MemorySessionStore, OutboundPayload, ReaderRoot, VerifierConfig,
    VerifierSessionCoordinator,
};

use crate::common::{b64url, document_signer, DOC_TYPE, NAMESPACE, ORIGIN};

fn b64url_decode(s: &str) -> Result<Vec<u8>> {
    Ok(base64::decode_config(s, base64::URL_SAFE_NO_PAD)?)
}

#[test_log::test(tokio::test)]
async fn arf_request_carries_payment_details() -> Result<()> {
    let root = Arc::new(ReaderRoot::generate()?);
    let coordinator = VerifierSessionCoordinator::new(
        VerifierConfig::new(ORIGIN)?,
        Arc::new(MemorySessionStore::new()),
        root.clone(),
    );
    let request = well_known::lookup(CredentialFormat::Mdoc, PAYMENT_DOCTYPE, "SCA")
        .context("no canned payment request")?;
    let payment = PaymentContext {
        merchant_name: Some("Bakery".into()),
        transaction_amount: Some("12.30".into()),
        transaction_currency_code: Some("EUR".into()),
        ..PaymentContext::default()
    };
    let (id, payload) = coordinator
        .begin_with(
            "w3c_dc_arf",
            request,
            ORIGIN,
            BeginOptions {
                scheme: None,
                payment: Some(payment),
            },
        )
        .await?;
    let OutboundPayload::DcRequest { request } = payload else {
        anyhow::bail!("expected a DC API request");
    };
    let request: serde_json::Value = serde_json::from_str(&request)?;

    // The wallet recomputes the transcript from the encryption info it was handed.
    let session = coordinator.session(&id).await?;
    let info = ArfEncryptionInfo::new(&session.nonce, &session.encryption_key()?.public_key());
    assert_eq!(request["encryptionInfo"], info.to_base64url()?);
    let transcript = SessionTranscript::dc_arf(&info, ORIGIN)?.to_bytes()?;

    let device_request = b64url_decode(request["deviceRequest"].as_str().context("deviceRequest")?)?;
    let parsed = DeviceRequestParser::parse(&device_request, &transcript)?;
    let doc = &parsed.doc_requests[0];
    assert_eq!(doc.doc_type(), PAYMENT_DOCTYPE);
    assert!(doc.reader_authenticated);

    let chain = doc.reader_cert_chain.as_ref().context("no reader chain")?;
    let mut trust = TrustManager::new();
    trust.add_trust_point(TrustPoint::new(root.certificate().clone()));
    let result = trust.verify_x5chain(chain, time::OffsetDateTime::now_utc());
    assert!(result.is_trusted);
    assert_eq!(result.trust_chain.len(), 2);

    let info = doc.request_info()?;
    let value = |key: &str| info.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
    assert_eq!(value("merchant_name"), Some(cbor::to_vec(&"Bakery")?));
    assert_eq!(value("transaction_amount"), Some(cbor::to_vec(&"12.30")?));
    assert_eq!(value("transaction_currency_code"), Some(cbor::to_vec(&"EUR")?));
    assert_eq!(value("payment_scheme"), None);
    Ok(())
}

#[tokio::test]
async fn preview_request_names_every_field() -> Result<()> {
    let coordinator = common::coordinator()?;
    let request = well_known::lookup(CredentialFormat::Mdoc, well_known::EUPID_DOCTYPE, "mandatory")
        .context("no canned PID request")?;
    let (id, payload) = coordinator.begin("w3c_dc_preview", request, ORIGIN).await?;
    let OutboundPayload::DcRequest { request } = payload else {
        anyhow::bail!("expected a DC API request");
    };
    let request: serde_json::Value = serde_json::from_str(&request)?;
    let fields = request["selector"]["fields"].as_array().context("fields")?;
    assert_eq!(fields.len(), 8);
    assert!(fields
        .iter()
        .all(|f| f["namespace"] == well_known::EUPID_NAMESPACE && f["intentToRetain"] == false));

    let session = coordinator.session(&id).await?;
    assert_eq!(request["nonce"], b64url(&session.nonce));
    assert_eq!(
        request["readerPublicKey"],
        b64url(common::uncompressed(&session.encryption_key()?.public_key()))
    );
    Ok(())
}

#[test_log::test]
fn two_signed_requests_read_back_unchanged() -> Result<()> {
    const PID_DOC_TYPE: &str = "eu.europa.ec.eudi.pid.1";
    let transcript = SessionTranscript::openid4vp(
        "x509_san_dns:verifier.example",
        "https://verifier.example/response",
        Some("YXV0aCBub25jZQ"),
        None,
    )?
    .to_bytes()?;
    let (key, chain) = document_signer("CN=Round Trip Reader,C=US")?;
    let reader_auth = || ReaderAuthKey {
        key: ReaderSigningKey::Es256(&key),
        chain: Some(&chain),
    };

    let mdl = DocumentRequestSpec::from_entries(
        DOC_TYPE,
        [(NAMESPACE, "family_name", true), (NAMESPACE, "portrait", false)],
    )?;
    let pid = DocumentRequestSpec::from_entries(
        PID_DOC_TYPE,
        [(PID_DOC_TYPE, "birth_date", false)],
    )?;
    let mdl_info = vec![
        ("purpose".to_string(), cbor::to_vec(&"age check")?),
        (
            "terminal".to_string(),
            cbor::to_vec(&ciborium::Value::Map(vec![(
                ciborium::Value::Text("id".into()),
                ciborium::Value::Integer(7.into()),
            )]))?,
        ),
    ];
    let pid_info = vec![("retention_days".to_string(), cbor::to_vec(&30)?)];

    let bytes = DeviceRequestGenerator::new(transcript.clone())
        .add_document_request(&mdl, Some(&mdl_info), Some(reader_auth()), None)?
        .add_document_request(&pid, Some(&pid_info), Some(reader_auth()), None)?
        .generate()?;
    let parsed = DeviceRequestParser::parse(&bytes, &transcript)?;
    assert_eq!(parsed.doc_requests.len(), 2);

    let (mdl_request, pid_request) = (&parsed.doc_requests[0], &parsed.doc_requests[1]);
    assert_eq!(mdl_request.doc_type(), DOC_TYPE);
    assert_eq!(mdl_request.entry_names(NAMESPACE)?, ["family_name", "portrait"]);
    assert!(mdl_request.intent_to_retain(NAMESPACE, "family_name")?);
    assert!(!mdl_request.intent_to_retain(NAMESPACE, "portrait")?);
    assert_eq!(mdl_request.request_info()?, mdl_info);

    assert_eq!(pid_request.doc_type(), PID_DOC_TYPE);
    assert_eq!(pid_request.namespaces(), [PID_DOC_TYPE]);
    assert_eq!(pid_request.entry_names(PID_DOC_TYPE)?, ["birth_date"]);
    assert!(!pid_request.intent_to_retain(PID_DOC_TYPE, "birth_date")?);
    assert_eq!(pid_request.request_info()?, pid_info);

    for request in &parsed.doc_requests {
        assert!(request.reader_authenticated);
        assert_eq!(request.reader_cert_chain.as_ref(), Some(&chain));
    }

    assert!(matches!(
        mdl_request.intent_to_retain(NAMESPACE, "given_name"),
        Err(reader::Error::UnknownDataElement { .. })
    ));
    assert!(matches!(
        pid_request.entry_names(NAMESPACE),
        Err(reader::Error::UnknownNamespace(_))
    ));
    Ok(())
}
