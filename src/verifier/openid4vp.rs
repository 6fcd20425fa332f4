//! OpenID4VP with signed request objects and `direct_post.jwt` responses.
use p256::PublicKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::form_urlencoded;

use super::config::VerifierConfig;
use super::reader_key::SingleUseReaderKey;
use super::session::VerifierSession;
use super::well_known::{CredentialFormat, CredentialRequest};
use super::{Error, OpenedResponse};
use crate::crypto::{b64url_decode, jwe, jws, PublicKeyJwk};
use crate::definitions::SessionTranscript;

pub const REQUEST_OBJECT_TYPE: &str = "oauth-authz-req+jwt";
pub const CLIENT_ID_SCHEME: &str = "x509_san_dns";
const RESPONSE_MODE: &str = "direct_post.jwt";

/// Claims of the signed authorization request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RequestObject {
    pub client_id: String,
    pub client_id_scheme: String,
    pub response_uri: String,
    pub response_type: String,
    pub response_mode: String,
    pub nonce: String,
    pub state: String,
    pub presentation_definition: Value,
    pub client_metadata: Value,
}

/// `<scheme>?client_id=...&request_uri=...`, the URI that launches a wallet.
pub fn launch_uri(scheme: &str, client_id: &str, request_uri: &str) -> String {
    let encode = |s: &str| form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    format!(
        "{scheme}?client_id={}&request_uri={}",
        encode(client_id),
        encode(request_uri)
    )
}

/// Sign the request object of `session` with the single-use reader key.
pub fn request_object(
    config: &VerifierConfig,
    session_id: &str,
    session: &VerifierSession,
    reader_key: &SingleUseReaderKey,
) -> Result<String, Error> {
    let encryption_key = session.encryption_key()?.public_key();
    let claims = RequestObject {
        client_id: config.client_id.clone(),
        client_id_scheme: CLIENT_ID_SCHEME.into(),
        response_uri: config.response_uri(session_id),
        response_type: "vp_token".into(),
        response_mode: RESPONSE_MODE.into(),
        nonce: session.nonce_hex(),
        state: session_id.to_string(),
        presentation_definition: presentation_definition(&session.request, session_id),
        client_metadata: client_metadata(session.request.format(), &encryption_key),
    };
    tracing::debug!("OpenID4VP request claims: {claims:?}");

    let header = jws::Header {
        typ: Some(REQUEST_OBJECT_TYPE.into()),
        x5c: Some(reader_key.chain.to_x5c()),
        ..jws::Header::es256()
    };
    Ok(jws::encode(&header, &claims, &reader_key.key)?)
}

/// A DIF presentation definition with a single input descriptor.
pub fn presentation_definition(request: &CredentialRequest, id: &str) -> Value {
    let (descriptor_id, format, fields) = match request {
        CredentialRequest::Mdoc { spec, .. } => {
            let fields: Vec<Value> = spec
                .entries()
                .map(|(namespace, element, intent_to_retain)| {
                    json!({
                        "path": [format!("$['{namespace}']['{element}']")],
                        "intent_to_retain": intent_to_retain,
                    })
                })
                .collect();
            (
                spec.doc_type.clone(),
                json!({ "mso_mdoc": { "alg": ["ES256"] } }),
                fields,
            )
        }
        CredentialRequest::Vc { spec, .. } => {
            let mut fields = vec![json!({
                "path": ["$.vct"],
                "filter": { "const": spec.vct },
            })];
            fields.extend(
                spec.claims
                    .iter()
                    .map(|claim| json!({ "path": [format!("$.{claim}")] })),
            );
            (
                "Example PID".to_string(),
                json!({ "jwt_vc": { "alg": ["ES256"] } }),
                fields,
            )
        }
    };
    json!({
        "id": id,
        "input_descriptors": [{
            "id": descriptor_id,
            "format": format,
            "constraints": {
                "limit_disclosure": "required",
                "fields": fields,
            },
        }],
    })
}

/// Client metadata advertising the response encryption key.
pub fn client_metadata(format: CredentialFormat, encryption_key: &PublicKey) -> Value {
    let vp_formats = match format {
        CredentialFormat::Mdoc => json!({ "mso_mdoc": { "alg": ["ES256"] } }),
        CredentialFormat::Vc => json!({ "jwt_vc": { "alg": ["ES256"] } }),
    };
    json!({
        "authorization_encrypted_response_alg": jwe::ALG_ECDH_ES,
        "authorization_encrypted_response_enc": jwe::ENC_A128CBC_HS256,
        "response_mode": RESPONSE_MODE,
        "vp_formats": vp_formats,
        "vp_formats_supported": vp_formats,
        "jwks": { "keys": [PublicKeyJwk::encryption_key(encryption_key)] },
    })
}

/// Decrypt a `response=<JWE>` form body and rebuild the transcript from the JWE's
/// `apu` (mdoc generated nonce) and `apv` (authorization request nonce).
pub fn open_response(
    body: &str,
    session: &VerifierSession,
    client_id: &str,
    response_uri: &str,
) -> Result<OpenedResponse, Error> {
    let token = form_urlencoded::parse(body.as_bytes())
        .find(|(key, _)| key == "response")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| Error::MissingField("response".into()))?;

    let decrypted = jwe::decrypt(&token, &session.encryption_key()?)?;
    let claims: Value = serde_json::from_slice(&decrypted.plaintext)
        .map_err(|e| Error::MalformedEncoding(format!("response claims: {e}")))?;
    let vp_token = claims
        .get("vp_token")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MissingField("vp_token".into()))?;

    let response = match session.request.format() {
        CredentialFormat::Mdoc => b64url_decode(vp_token)?,
        CredentialFormat::Vc => vp_token.as_bytes().to_vec(),
    };

    let apu = decrypted.header.apu.as_deref();
    let apv = decrypted.header.apv.as_deref();
    if session.request.format() == CredentialFormat::Mdoc && (apu.is_none() || apv.is_none()) {
        tracing::warn!("mdoc wallet did not provide both apu and apv JWE headers");
    }
    let transcript = SessionTranscript::openid4vp(client_id, response_uri, apv, apu)?.to_bytes()?;
    tracing::debug!("OpenID4VP SessionTranscript: {}", hex::encode(&transcript));

    Ok(OpenedResponse {
        response,
        session_transcript: transcript,
    })
}

#[cfg(test)]
pub(crate) mod test {
    use p256::SecretKey;

    use super::*;
    use crate::crypto::b64url;
    use crate::verifier::well_known::{lookup, EUPID_VCT, MDL_DOCTYPE};
    use crate::verifier::{Protocol, ReaderRoot};

    /// Encrypt `vp_token` the way a wallet posts it back.
    pub(crate) fn wallet_response(
        session: &VerifierSession,
        vp_token: &str,
        apu: Option<&str>,
        apv: Option<&str>,
    ) -> String {
        let recipient = session.encryption_key().unwrap().public_key();
        let claims = json!({ "vp_token": vp_token, "state": "ignored" });
        let token = jwe::encrypt(
            &serde_json::to_vec(&claims).unwrap(),
            &recipient,
            apu,
            apv,
        )
        .unwrap();
        format!("response={token}")
    }

    fn session(request: CredentialRequest) -> VerifierSession {
        VerifierSession::new(
            request,
            Protocol::PlainOpenId4Vp,
            vec![0x5a; VerifierSession::NONCE_LEN],
            String::new(),
            &SecretKey::random(&mut rand::thread_rng()),
            None,
        )
    }

    #[test]
    fn launch_uri_encoding() {
        assert_eq!(
            launch_uri(
                "openid4vp://",
                "x509_san_dns:verifier.example",
                "https://verifier.example/verifier/openid4vpRequest?sessionId=abc"
            ),
            "openid4vp://?client_id=x509_san_dns%3Averifier.example&request_uri=https%3A%2F%2Fverifier.example%2Fverifier%2Fopenid4vpRequest%3FsessionId%3Dabc"
        );
    }

    #[test_log::test]
    fn signed_request_object() {
        let config = VerifierConfig::new("https://verifier.example").unwrap();
        let session = session(lookup(CredentialFormat::Mdoc, MDL_DOCTYPE, "age_over_18").unwrap());
        let reader = ReaderRoot::generate().unwrap().mint().unwrap();
        let token = request_object(&config, "abc", &session, &reader).unwrap();

        let decoded = jws::decode::<RequestObject>(&token).unwrap();
        decoded.verify(reader.key.verifying_key()).unwrap();
        assert_eq!(decoded.header.typ.as_deref(), Some(REQUEST_OBJECT_TYPE));
        assert_eq!(decoded.header.x5c.as_ref().unwrap().len(), 2);

        let claims = decoded.claims;
        assert_eq!(claims.client_id, "x509_san_dns:verifier.example");
        assert_eq!(claims.client_id_scheme, "x509_san_dns");
        assert_eq!(
            claims.response_uri,
            "https://verifier.example/verifier/openid4vpResponse?sessionId=abc"
        );
        assert_eq!(claims.response_mode, "direct_post.jwt");
        assert_eq!(claims.nonce, "5a".repeat(16));
        assert_eq!(claims.state, "abc");

        let descriptor = &claims.presentation_definition["input_descriptors"][0];
        assert_eq!(descriptor["id"], MDL_DOCTYPE);
        assert_eq!(descriptor["constraints"]["limit_disclosure"], "required");
        assert_eq!(
            descriptor["constraints"]["fields"][0],
            json!({"path": ["$['org.iso.18013.5.1']['age_over_18']"], "intent_to_retain": false})
        );

        let jwk: PublicKeyJwk =
            serde_json::from_value(claims.client_metadata["jwks"]["keys"][0].clone()).unwrap();
        assert_eq!(jwk.use_.as_deref(), Some("enc"));
        assert_eq!(
            jwk.to_public_key().unwrap(),
            session.encryption_key().unwrap().public_key()
        );
        assert_eq!(
            claims.client_metadata["vp_formats_supported"],
            json!({"mso_mdoc": {"alg": ["ES256"]}})
        );
    }

    #[test]
    fn vc_presentation_definition() {
        let request = lookup(CredentialFormat::Vc, EUPID_VCT, "mandatory").unwrap();
        let definition = presentation_definition(&request, "abc");
        let descriptor = &definition["input_descriptors"][0];
        assert_eq!(descriptor["id"], "Example PID");
        assert_eq!(descriptor["format"], json!({"jwt_vc": {"alg": ["ES256"]}}));
        let fields = descriptor["constraints"]["fields"].as_array().unwrap();
        assert_eq!(fields[0], json!({"path": ["$.vct"], "filter": {"const": EUPID_VCT}}));
        assert_eq!(fields[1], json!({"path": ["$.family_name"]}));
        assert_eq!(fields.len(), 9);
    }

    #[test_log::test]
    fn opens_mdoc_response() {
        let session = session(lookup(CredentialFormat::Mdoc, MDL_DOCTYPE, "age_over_18").unwrap());
        let apu = b64url("mdoc nonce");
        let apv = b64url("request nonce");
        let body = wallet_response(&session, &b64url(b"\xa0"), Some(&apu), Some(&apv));

        let opened = open_response(&body, &session, "client", "https://response").unwrap();
        assert_eq!(opened.response, b"\xa0");
        let expected = SessionTranscript::openid4vp("client", "https://response", Some(&apv), Some(&apu))
            .unwrap()
            .to_bytes()
            .unwrap();
        assert_eq!(opened.session_transcript, expected);
    }

    #[test]
    fn opens_vc_response_without_agreement_info() {
        let session = session(lookup(CredentialFormat::Vc, EUPID_VCT, "mandatory").unwrap());
        let body = wallet_response(&session, "eyJ.eyJ.sig~", None, None);
        let opened = open_response(&body, &session, "client", "https://response").unwrap();
        assert_eq!(opened.response, b"eyJ.eyJ.sig~");
    }

    #[test]
    fn malformed_bodies() {
        let mdoc = || session(lookup(CredentialFormat::Mdoc, MDL_DOCTYPE, "age_over_18").unwrap());
        let verifier = mdoc();
        assert!(matches!(
            open_response("state=abc", &verifier, "client", "uri"),
            Err(Error::MissingField(field)) if field == "response"
        ));
        assert!(matches!(
            open_response("response=a.b.c", &verifier, "client", "uri"),
            Err(Error::MalformedEncoding(_))
        ));

        let body = wallet_response(&mdoc(), "oA", None, None);
        assert!(matches!(
            open_response(&body, &verifier, "client", "uri"),
            Err(Error::DecryptFailure(_))
        ));
    }
}
