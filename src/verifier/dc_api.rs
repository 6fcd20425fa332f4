//! The W3C Digital Credentials API exchanges: the Android "preview" protocol and the
//! ARF protocol. Both return an HPKE-sealed `DeviceResponse` with the session
//! transcript as additional authenticated data.
use ciborium::Value;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use serde_json::json;

use super::reader_key::SingleUseReaderKey;
use super::session::VerifierSession;
use super::{Error, OpenedResponse};
use crate::cbor;
use crate::crypto::{b64url, b64url_decode, hpke};
use crate::definitions::device_request::DocumentRequestSpec;
use crate::definitions::{ArfEncryptionInfo, CoseKey, SessionTranscript};
use crate::presentation::reader::{
    DeviceRequestGenerator, PaymentContext, ReaderAuthKey, ReaderSigningKey,
};

pub const PREVIEW_RESPONSE_VERSION: &str = "ANDROID-HPKE-v1";
pub const ARF_RESPONSE_TAG: &str = "ARFencryptionv2";

/// The `{selector, nonce, readerPublicKey}` request of the preview protocol.
pub fn preview_request(
    spec: &DocumentRequestSpec,
    nonce: &[u8],
    reader_public_key: &PublicKey,
) -> Result<String, Error> {
    let fields: Vec<serde_json::Value> = spec
        .entries()
        .map(|(namespace, name, intent_to_retain)| {
            json!({
                "namespace": namespace.as_str(),
                "name": name.as_str(),
                "intentToRetain": intent_to_retain,
            })
        })
        .collect();
    let request = json!({
        "selector": {
            "format": ["mdoc"],
            "doctype": spec.doc_type,
            "fields": fields,
        },
        "nonce": b64url(nonce),
        "readerPublicKey": b64url(reader_public_key.to_encoded_point(false).as_bytes()),
    });
    Ok(request.to_string())
}

/// The `{deviceRequest, encryptionInfo}` request of the ARF protocol. The device request
/// is signed by `reader_key` over the ARF session transcript.
pub fn arf_request(
    spec: &DocumentRequestSpec,
    nonce: &[u8],
    origin: &str,
    encryption_key: &PublicKey,
    reader_key: &SingleUseReaderKey,
    payment: Option<&PaymentContext>,
) -> Result<String, Error> {
    let encryption_info = ArfEncryptionInfo::new(nonce, encryption_key);
    let transcript = SessionTranscript::dc_arf(&encryption_info, origin)?.to_bytes()?;
    tracing::debug!("ARF SessionTranscript: {}", hex::encode(&transcript));

    let mut generator = DeviceRequestGenerator::new(transcript);
    generator.add_document_request(
        spec,
        None,
        Some(ReaderAuthKey {
            key: ReaderSigningKey::Es256(&reader_key.key),
            chain: Some(&reader_key.chain),
        }),
        payment,
    )?;
    let device_request = generator.generate()?;

    let request = json!({
        "deviceRequest": b64url(device_request),
        "encryptionInfo": encryption_info.to_base64url()?,
    });
    Ok(request.to_string())
}

/// Open a preview response, `{"token": base64url(CBOR)}`.
pub fn open_preview(
    credential_response: &str,
    session: &VerifierSession,
) -> Result<OpenedResponse, Error> {
    let token = json_field(credential_response, "token")?;
    let envelope: Value = cbor::from_slice(&b64url_decode(&token)?)?;
    let Value::Map(entries) = &envelope else {
        return Err(Error::MalformedEncoding("preview response is not a map".into()));
    };

    match cbor::map_get(entries, "version") {
        Some(Value::Text(version)) if version == PREVIEW_RESPONSE_VERSION => {}
        Some(other) => {
            return Err(Error::MalformedEncoding(format!(
                "unexpected preview response version {}",
                cbor::diagnostic(other)
            )))
        }
        None => return Err(Error::MissingField("version".into())),
    }
    let pk_em = match cbor::map_get(entries, "encryptionParameters") {
        Some(Value::Map(parameters)) => match cbor::map_get(parameters, "pkEm") {
            Some(Value::Bytes(pk_em)) => pk_em,
            _ => return Err(Error::MissingField("encryptionParameters.pkEm".into())),
        },
        _ => return Err(Error::MissingField("encryptionParameters".into())),
    };
    let cipher_text = bytes_field(entries, "cipherText")?;

    let encapsulated = PublicKey::from_sec1_bytes(pk_em)
        .map_err(|_| Error::MalformedEncoding("pkEm is not a P-256 point".into()))?;
    let recipient = session.encryption_key()?;
    let transcript = SessionTranscript::dc_preview(
        &session.nonce,
        &session.origin,
        &recipient.public_key(),
    )?
    .to_bytes()?;
    tracing::debug!("preview SessionTranscript: {}", hex::encode(&transcript));

    let response = hpke::open(&recipient, &encapsulated, &[], &transcript, cipher_text)?;
    Ok(OpenedResponse {
        response,
        session_transcript: transcript,
    })
}

/// Open an ARF response, `{"encryptedResponse": base64url(CBOR)}`.
pub fn open_arf(
    credential_response: &str,
    session: &VerifierSession,
) -> Result<OpenedResponse, Error> {
    let encrypted = json_field(credential_response, "encryptedResponse")?;
    let envelope: Value = cbor::from_slice(&b64url_decode(&encrypted)?)?;
    let entries = match &envelope {
        Value::Array(items) => match items.as_slice() {
            [Value::Text(tag), Value::Map(entries)] if tag == ARF_RESPONSE_TAG => entries,
            _ => {
                return Err(Error::MalformedEncoding(format!(
                    "expected [\"{ARF_RESPONSE_TAG}\", {{...}}]"
                )))
            }
        },
        _ => return Err(Error::MalformedEncoding("ARF response is not an array".into())),
    };

    let pk_em = cbor::map_get(entries, "pkEM")
        .cloned()
        .ok_or_else(|| Error::MissingField("pkEM".into()))?;
    let encapsulated = CoseKey::try_from(pk_em)
        .and_then(|key| key.to_p256())
        .map_err(|e| Error::MalformedEncoding(format!("pkEM: {e}")))?;
    let cipher_text = bytes_field(entries, "cipherText")?;

    let recipient = session.encryption_key()?;
    let encryption_info = ArfEncryptionInfo::new(&session.nonce, &recipient.public_key());
    let transcript = SessionTranscript::dc_arf(&encryption_info, &session.origin)?.to_bytes()?;

    let response = hpke::open(&recipient, &encapsulated, &[], &transcript, cipher_text)?;
    Ok(OpenedResponse {
        response,
        session_transcript: transcript,
    })
}

fn json_field(body: &str, field: &str) -> Result<String, Error> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::MalformedEncoding(format!("credential response: {e}")))?;
    value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::MissingField(field.to_string()))
}

fn bytes_field<'a>(entries: &'a [(Value, Value)], field: &str) -> Result<&'a [u8], Error> {
    match cbor::map_get(entries, field) {
        Some(Value::Bytes(bytes)) => Ok(bytes),
        _ => Err(Error::MissingField(field.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod test {
    use p256::SecretKey;

    use super::*;
    use crate::definitions::device_request::DeviceRequest;
    use crate::presentation::reader::DeviceRequestParser;
    use crate::verifier::well_known::{lookup, CredentialFormat, CredentialRequest, MDL_DOCTYPE};
    use crate::verifier::{Protocol, ReaderRoot};

    const ORIGIN: &str = "https://verifier.example";

    pub(crate) fn seal_preview(session: &VerifierSession, response: &[u8]) -> String {
        let reader = session.encryption_key().unwrap().public_key();
        let transcript = SessionTranscript::dc_preview(&session.nonce, &session.origin, &reader)
            .unwrap()
            .to_bytes()
            .unwrap();
        let sealed = hpke::seal(&reader, &[], &transcript, response).unwrap();
        let envelope = Value::Map(vec![
            (Value::Text("version".into()), Value::Text(PREVIEW_RESPONSE_VERSION.into())),
            (
                Value::Text("encryptionParameters".into()),
                Value::Map(vec![(Value::Text("pkEm".into()), Value::Bytes(sealed.enc))]),
            ),
            (Value::Text("cipherText".into()), Value::Bytes(sealed.ciphertext)),
        ]);
        json!({ "token": b64url(cbor::to_vec(&envelope).unwrap()) }).to_string()
    }

    pub(crate) fn seal_arf(session: &VerifierSession, response: &[u8]) -> String {
        let reader = session.encryption_key().unwrap().public_key();
        let info = ArfEncryptionInfo::new(&session.nonce, &reader);
        let transcript = SessionTranscript::dc_arf(&info, &session.origin)
            .unwrap()
            .to_bytes()
            .unwrap();
        let sealed = hpke::seal(&reader, &[], &transcript, response).unwrap();
        let encapsulated = PublicKey::from_sec1_bytes(&sealed.enc).unwrap();
        let envelope = Value::Array(vec![
            Value::Text(ARF_RESPONSE_TAG.into()),
            Value::Map(vec![
                (Value::Text("pkEM".into()), CoseKey::from(&encapsulated).into()),
                (Value::Text("cipherText".into()), Value::Bytes(sealed.ciphertext)),
            ]),
        ]);
        json!({ "encryptedResponse": b64url(cbor::to_vec(&envelope).unwrap()) }).to_string()
    }

    fn session(protocol: Protocol) -> VerifierSession {
        VerifierSession::new(
            lookup(CredentialFormat::Mdoc, MDL_DOCTYPE, "age_over_18").unwrap(),
            protocol,
            vec![3u8; VerifierSession::NONCE_LEN],
            ORIGIN.into(),
            &SecretKey::random(&mut rand::thread_rng()),
            None,
        )
    }

    fn spec(session: &VerifierSession) -> &DocumentRequestSpec {
        match &session.request {
            CredentialRequest::Mdoc { spec, .. } => spec,
            CredentialRequest::Vc { .. } => panic!("expected an mdoc request"),
        }
    }

    #[test]
    fn preview_request_json() {
        let session = session(Protocol::W3cDcPreview);
        let key = session.encryption_key().unwrap().public_key();
        let request: serde_json::Value =
            serde_json::from_str(&preview_request(spec(&session), &session.nonce, &key).unwrap())
                .unwrap();
        assert_eq!(request["selector"]["format"], json!(["mdoc"]));
        assert_eq!(request["selector"]["doctype"], MDL_DOCTYPE);
        assert_eq!(
            request["selector"]["fields"][0],
            json!({"namespace": "org.iso.18013.5.1", "name": "age_over_18", "intentToRetain": false})
        );
        assert_eq!(request["nonce"], b64url([3u8; 16]));
        let reader_key = b64url_decode(request["readerPublicKey"].as_str().unwrap()).unwrap();
        assert_eq!(reader_key.len(), 65);
        assert_eq!(PublicKey::from_sec1_bytes(&reader_key).unwrap(), key);
    }

    #[test_log::test]
    fn arf_request_is_reader_authenticated() {
        let session = session(Protocol::W3cDcArf);
        let key = session.encryption_key().unwrap().public_key();
        let reader = ReaderRoot::generate().unwrap().mint().unwrap();
        let request: serde_json::Value = serde_json::from_str(
            &arf_request(spec(&session), &session.nonce, ORIGIN, &key, &reader, None).unwrap(),
        )
        .unwrap();

        let info = request["encryptionInfo"].as_str().unwrap();
        assert_eq!(info, ArfEncryptionInfo::new(&session.nonce, &key).to_base64url().unwrap());
        let device_request =
            b64url_decode(request["deviceRequest"].as_str().unwrap()).unwrap();
        let _: DeviceRequest = cbor::from_slice(&device_request).unwrap();

        let transcript = SessionTranscript::dc_arf(&ArfEncryptionInfo::new(&session.nonce, &key), ORIGIN)
            .unwrap()
            .to_bytes()
            .unwrap();
        let parsed = DeviceRequestParser::parse(&device_request, &transcript).unwrap();
        assert!(parsed.doc_requests[0].reader_authenticated);
        assert_eq!(
            parsed.doc_requests[0].reader_cert_chain.as_ref().unwrap().len(),
            2
        );
    }

    #[test]
    fn opens_preview_and_arf_responses() {
        let preview = session(Protocol::W3cDcPreview);
        let opened = open_preview(&seal_preview(&preview, b"\xa0"), &preview).unwrap();
        assert_eq!(opened.response, b"\xa0");
        let Value::Array(items) = cbor::from_slice::<Value>(&opened.session_transcript).unwrap()
        else {
            panic!("transcript is not an array")
        };
        assert_eq!(items.len(), 3);

        let arf = session(Protocol::W3cDcArf);
        let opened = open_arf(&seal_arf(&arf, b"\xa1\x01\x02"), &arf).unwrap();
        assert_eq!(opened.response, b"\xa1\x01\x02");
    }

    #[test]
    fn wrong_session_fails_to_decrypt() {
        let sealed_for = session(Protocol::W3cDcPreview);
        let other = session(Protocol::W3cDcPreview);
        assert!(matches!(
            open_preview(&seal_preview(&sealed_for, b"\xa0"), &other),
            Err(Error::DecryptFailure(_))
        ));

        // Same key, different origin: the transcript no longer authenticates.
        let mut moved = sealed_for.clone();
        moved.origin = "https://attacker.example".into();
        assert!(matches!(
            open_preview(&seal_preview(&sealed_for, b"\xa0"), &moved),
            Err(Error::DecryptFailure(_))
        ));
    }

    #[test]
    fn malformed_responses() {
        let session = session(Protocol::W3cDcArf);
        assert!(matches!(
            open_arf("{}", &session),
            Err(Error::MissingField(field)) if field == "encryptedResponse"
        ));
        assert!(matches!(
            open_arf("not json", &session),
            Err(Error::MalformedEncoding(_))
        ));
        let wrong_tag = json!({
            "encryptedResponse": b64url(cbor::to_vec(&Value::Array(vec![
                Value::Text("ARFencryptionv1".into()),
                Value::Map(vec![]),
            ])).unwrap())
        });
        assert!(matches!(
            open_arf(&wrong_tag.to_string(), &session),
            Err(Error::MalformedEncoding(_))
        ));
        assert!(matches!(
            open_preview(r#"{"token": 5}"#, &session),
            Err(Error::MissingField(_))
        ));
    }
}
