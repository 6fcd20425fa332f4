//! Verifier sessions: issue a request over one of the supported transports, accept the
//! holder's response and extract the presented claims.
//!
//! Sessions live in a [`SessionStore`] and nothing is cached in-process, so any number of
//! coordinators may serve the same store.
use std::sync::Arc;

use p256::SecretKey;
use rand::RngCore;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

pub mod config;
pub mod dc_api;
pub mod error;
pub mod openid4vp;
pub mod protocol;
pub mod reader_key;
pub mod session;
pub mod storage;
pub mod well_known;
pub mod worker;

pub use config::VerifierConfig;
pub use error::Error;
pub use protocol::Protocol;
pub use reader_key::{ReaderRoot, SingleUseReaderKey};
pub use session::{SessionState, VerifierSession};
pub use storage::{MemorySessionStore, SessionStore, StorageError};
pub use well_known::{CredentialFormat, CredentialRequest, VcRequestSpec};
pub use worker::CryptoPool;

use crate::cbor;
use crate::definitions::device_request::DocumentRequestSpec;
use crate::presentation::reader::sd_jwt::SdJwtPresentation;
use crate::presentation::reader::{DeviceResponseValidator, PaymentContext};

/// One line of extracted data, e.g. `("family_name", "\"Mustermann\"")`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResultLine {
    pub key: String,
    pub value: String,
}

impl ResultLine {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// What the caller hands to the holder to start a presentation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutboundPayload {
    /// The JSON request passed to `navigator.credentials.get`.
    #[serde(rename_all = "camelCase")]
    DcRequest { request: String },
    /// A wallet launch URI and the signed request object served at its `request_uri`.
    #[serde(rename_all = "camelCase")]
    OpenId4Vp { uri: String, request_object: String },
}

/// A decrypted response and the transcript it was presented over.
#[derive(Clone, Debug)]
pub struct OpenedResponse {
    pub response: Vec<u8>,
    pub session_transcript: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct BeginOptions {
    /// Launch scheme for [`Protocol::CustomOpenId4Vp`], e.g. `haip://`.
    pub scheme: Option<String>,
    pub payment: Option<PaymentContext>,
}

/// Drives verifier sessions from request to extracted data.
#[derive(Clone)]
pub struct VerifierSessionCoordinator {
    config: VerifierConfig,
    store: Arc<dyn SessionStore>,
    reader_root: Arc<ReaderRoot>,
    pool: CryptoPool,
}

impl VerifierSessionCoordinator {
    pub fn new(
        config: VerifierConfig,
        store: Arc<dyn SessionStore>,
        reader_root: Arc<ReaderRoot>,
    ) -> Self {
        let pool = CryptoPool::new(config.crypto_workers);
        Self {
            config,
            store,
            reader_root,
            pool,
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Start a session. Returns its id and the payload for the holder.
    pub async fn begin(
        &self,
        protocol: &str,
        request: CredentialRequest,
        origin: &str,
    ) -> Result<(String, OutboundPayload), Error> {
        self.begin_with(protocol, request, origin, BeginOptions::default())
            .await
    }

    pub async fn begin_with(
        &self,
        protocol: &str,
        request: CredentialRequest,
        origin: &str,
        options: BeginOptions,
    ) -> Result<(String, OutboundPayload), Error> {
        let protocol = Protocol::parse(protocol)?;
        if protocol.is_dc_api() && request.format() != CredentialFormat::Mdoc {
            return Err(Error::Configuration(format!(
                "{protocol} only carries mdoc requests"
            )));
        }
        let scheme = match protocol {
            Protocol::CustomOpenId4Vp => Some(
                options
                    .scheme
                    .filter(|scheme| !scheme.is_empty())
                    .ok_or_else(|| Error::MissingField("scheme".into()))?,
            ),
            other => other.uri_scheme().map(str::to_string),
        };

        let mut nonce = vec![0u8; VerifierSession::NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let encryption_key = SecretKey::random(&mut rand::thread_rng());
        let mut session = VerifierSession::new(
            request,
            protocol,
            nonce,
            origin.to_string(),
            &encryption_key,
            options.payment,
        );
        // Only a session whose request was built is stored.
        let session_id = Uuid::new_v4().simple().to_string();
        let (payload, response_uri) = {
            let session = session.clone();
            let session_id = session_id.clone();
            let config = self.config.clone();
            let reader_root = self.reader_root.clone();
            self.pool
                .run(move || {
                    outbound_payload(&config, &reader_root, &session_id, &session, scheme)
                })
                .await?
        };

        session.state = SessionState::RequestSent { response_uri };
        let session_id = self
            .store
            .insert(Some(session_id), session.to_bytes()?, self.expiration())
            .await?;
        tracing::info!(
            "session {session_id}: {protocol} request for {} sent",
            session.request.doc_type()
        );
        Ok((session_id, payload))
    }

    /// Accept the holder's response. On failure the stored session is left as it was.
    pub async fn deliver_response(&self, session_id: &str, response: &str) -> Result<(), Error> {
        let mut session = self.load(session_id).await?;
        let response_uri = match &session.state {
            SessionState::RequestSent { response_uri } => response_uri.clone(),
            other => {
                return Err(Error::WrongState {
                    expected: "request_sent",
                    actual: other.name(),
                })
            }
        };

        let opened = {
            let session = session.clone();
            let body = response.to_string();
            let client_id = self.config.client_id.clone();
            self.pool
                .run(move || match session.protocol {
                    Protocol::W3cDcPreview => dc_api::open_preview(&body, &session),
                    Protocol::W3cDcArf => dc_api::open_arf(&body, &session),
                    Protocol::PlainOpenId4Vp
                    | Protocol::EudiOpenId4Vp
                    | Protocol::MdocOpenId4Vp
                    | Protocol::CustomOpenId4Vp => {
                        let response_uri =
                            response_uri.ok_or_else(|| Error::MissingField("responseUri".into()))?;
                        openid4vp::open_response(&body, &session, &client_id, &response_uri)
                    }
                })
                .await
        };
        let opened = match opened {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!("session {session_id}: rejected response: {e}");
                return Err(e);
            }
        };

        session.state = SessionState::ResponseReceived {
            response: opened.response,
            session_transcript: opened.session_transcript,
        };
        self.store
            .update(session_id, session.to_bytes()?, self.expiration())
            .await?;
        tracing::info!("session {session_id}: response received");
        Ok(())
    }

    /// Extract the presented data. May be called again once the data was extracted.
    pub async fn get_data(&self, session_id: &str) -> Result<Vec<ResultLine>, Error> {
        let mut session = self.load(session_id).await?;
        let (response, session_transcript) = match &session.state {
            SessionState::ResponseReceived {
                response,
                session_transcript,
            }
            | SessionState::DataExtracted {
                response,
                session_transcript,
            } => (response.clone(), session_transcript.clone()),
            other => {
                return Err(Error::WrongState {
                    expected: "response_received",
                    actual: other.name(),
                })
            }
        };

        let lines = {
            let format = session.request.format();
            let audience = self.config.client_id.clone();
            let nonce = session.nonce_hex();
            let response = response.clone();
            let session_transcript = session_transcript.clone();
            self.pool
                .run(move || match format {
                    CredentialFormat::Mdoc => mdoc_lines(&response, &session_transcript),
                    CredentialFormat::Vc => vc_lines(&response, &audience, &nonce),
                })
                .await?
        };

        if let SessionState::ResponseReceived { .. } = session.state {
            session.state = SessionState::DataExtracted {
                response,
                session_transcript,
            };
            self.store
                .update(session_id, session.to_bytes()?, self.expiration())
                .await?;
            tracing::info!("session {session_id}: data extracted");
        }
        Ok(lines)
    }

    /// The current state of a session.
    pub async fn state(&self, session_id: &str) -> Result<SessionState, Error> {
        Ok(self.load(session_id).await?.state)
    }

    /// The stored session, e.g. to recompute its transcript.
    pub async fn session(&self, session_id: &str) -> Result<VerifierSession, Error> {
        self.load(session_id).await
    }

    async fn load(&self, session_id: &str) -> Result<VerifierSession, Error> {
        let bytes = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| Error::MissingSession(session_id.to_string()))?;
        VerifierSession::from_bytes(&bytes)
    }

    fn expiration(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc() + self.config.session_ttl
    }
}

fn outbound_payload(
    config: &VerifierConfig,
    reader_root: &ReaderRoot,
    session_id: &str,
    session: &VerifierSession,
    scheme: Option<String>,
) -> Result<(OutboundPayload, Option<String>), Error> {
    let encryption_key = session.encryption_key()?.public_key();
    match session.protocol {
        Protocol::W3cDcPreview => {
            let request =
                dc_api::preview_request(mdoc_spec(&session.request)?, &session.nonce, &encryption_key)?;
            Ok((OutboundPayload::DcRequest { request }, None))
        }
        Protocol::W3cDcArf => {
            let reader_key = reader_root.mint()?;
            let request = dc_api::arf_request(
                mdoc_spec(&session.request)?,
                &session.nonce,
                &session.origin,
                &encryption_key,
                &reader_key,
                session.payment.as_ref(),
            )?;
            Ok((OutboundPayload::DcRequest { request }, None))
        }
        Protocol::PlainOpenId4Vp
        | Protocol::EudiOpenId4Vp
        | Protocol::MdocOpenId4Vp
        | Protocol::CustomOpenId4Vp => {
            let scheme = scheme.ok_or_else(|| Error::MissingField("scheme".into()))?;
            let reader_key = reader_root.mint()?;
            let request_object =
                openid4vp::request_object(config, session_id, session, &reader_key)?;
            let uri = openid4vp::launch_uri(
                &scheme,
                &config.client_id,
                &config.request_uri(session_id),
            );
            Ok((
                OutboundPayload::OpenId4Vp {
                    uri,
                    request_object,
                },
                Some(config.response_uri(session_id)),
            ))
        }
    }
}

fn mdoc_spec(request: &CredentialRequest) -> Result<&DocumentRequestSpec, Error> {
    match request {
        CredentialRequest::Mdoc { spec, .. } => Ok(spec),
        CredentialRequest::Vc { .. } => Err(Error::Configuration(
            "the protocol only carries mdoc requests".into(),
        )),
    }
}

fn mdoc_lines(response: &[u8], session_transcript: &[u8]) -> Result<Vec<ResultLine>, Error> {
    let validated = DeviceResponseValidator::parse(response, session_transcript)?;
    let mut lines = Vec::new();
    for document in &validated.documents {
        lines.push(ResultLine::new("DocType", document.doc_type()));
        for namespace in document.issuer_namespaces() {
            lines.push(ResultLine::new("NameSpace", namespace));
            for element in document.issuer_entry_names(namespace)? {
                let data = document.issuer_entry_data(namespace, element)?;
                lines.push(ResultLine::new(element, cbor::diagnostic_from_slice(&data)));
            }
        }
    }
    Ok(lines)
}

fn vc_lines(response: &[u8], audience: &str, nonce: &str) -> Result<Vec<ResultLine>, Error> {
    let text = std::str::from_utf8(response)
        .map_err(|e| Error::MalformedEncoding(format!("SD-JWT presentation: {e}")))?;
    let presentation = SdJwtPresentation::parse(text)?;
    let mut lines: Vec<ResultLine> = presentation
        .display_lines()?
        .into_iter()
        .map(|(key, value)| ResultLine::new(key, value))
        .collect();
    if let Err(e) = presentation.verify_key_binding(audience, nonce) {
        tracing::warn!("SD-JWT key binding failed: {e}");
        lines.push(ResultLine::new("Key bound", "false"));
    }
    Ok(lines)
}

#[cfg(test)]
mod test {
    use ciborium::Value;
    use p256::ecdsa::SigningKey;
    use serde_json::json;

    use super::*;
    use crate::crypto::b64url;
    use crate::definitions::SessionTranscript;
    use crate::presentation::reader::mdoc_auth;
    use crate::presentation::reader::sd_jwt;
    use crate::presentation::reader::test::issue;
    use super::well_known::{lookup, EUPID_VCT, MDL_DOCTYPE, MDL_NAMESPACE};

    const ORIGIN: &str = "https://verifier.example";

    fn coordinator() -> VerifierSessionCoordinator {
        VerifierSessionCoordinator::new(
            VerifierConfig::new(ORIGIN).unwrap(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(ReaderRoot::generate().unwrap()),
        )
    }

    fn age_request() -> CredentialRequest {
        lookup(CredentialFormat::Mdoc, MDL_DOCTYPE, "age_over_18").unwrap()
    }

    fn mdoc_response(transcript: &[u8]) -> Vec<u8> {
        let mdoc = issue(
            MDL_DOCTYPE,
            &[
                (MDL_NAMESPACE, "age_over_18", Value::Bool(true)),
                (MDL_NAMESPACE, "portrait", Value::Bytes(vec![0xff; 1024])),
            ],
            transcript,
        );
        cbor::to_vec(&mdoc.response).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn preview_session() {
        let coordinator = coordinator();
        let (id, payload) = coordinator.begin("w3c_dc_preview", age_request(), ORIGIN).await.unwrap();
        assert!(matches!(payload, OutboundPayload::DcRequest { .. }));
        assert_eq!(
            coordinator.state(&id).await.unwrap(),
            SessionState::RequestSent { response_uri: None }
        );

        let session = coordinator.session(&id).await.unwrap();
        let transcript = SessionTranscript::dc_preview(
            &session.nonce,
            ORIGIN,
            &session.encryption_key().unwrap().public_key(),
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        let response = dc_api::test::seal_preview(&session, &mdoc_response(&transcript));
        coordinator.deliver_response(&id, &response).await.unwrap();

        let SessionState::ResponseReceived {
            session_transcript, ..
        } = coordinator.state(&id).await.unwrap()
        else {
            panic!("expected a received response")
        };
        assert_eq!(session_transcript, transcript);

        let lines = coordinator.get_data(&id).await.unwrap();
        assert_eq!(
            lines,
            vec![
                ResultLine::new("DocType", MDL_DOCTYPE),
                ResultLine::new("NameSpace", MDL_NAMESPACE),
                ResultLine::new("age_over_18", "true"),
                ResultLine::new("portrait", "<1024 bytes>"),
            ]
        );
        assert_eq!(coordinator.state(&id).await.unwrap().name(), "data_extracted");
        assert_eq!(coordinator.get_data(&id).await.unwrap(), lines);
    }

    #[tokio::test]
    async fn arf_response_is_bound_to_the_session() {
        let coordinator = coordinator();
        let (id, payload) = coordinator.begin("w3c_dc_arf", age_request(), ORIGIN).await.unwrap();
        let OutboundPayload::DcRequest { request } = payload else {
            panic!("expected a DC API request")
        };
        let request: serde_json::Value = serde_json::from_str(&request).unwrap();
        assert!(request["deviceRequest"].is_string());

        let session = coordinator.session(&id).await.unwrap();
        let transcript = SessionTranscript::dc_arf(
            &crate::definitions::ArfEncryptionInfo::new(
                &session.nonce,
                &session.encryption_key().unwrap().public_key(),
            ),
            ORIGIN,
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        let response = dc_api::test::seal_arf(&session, &mdoc_response(&transcript));
        coordinator.deliver_response(&id, &response).await.unwrap();

        let SessionState::ResponseReceived {
            response,
            session_transcript,
        } = coordinator.state(&id).await.unwrap()
        else {
            panic!("expected a received response")
        };
        let validated = DeviceResponseValidator::parse(&response, &session_transcript).unwrap();
        let document = &validated.documents[0];
        let mso = mdoc_auth::issuer_authentication(document).unwrap();
        mdoc_auth::verify_digests(document, &mso).unwrap();
        mdoc_auth::device_authentication(document, &mso, &session_transcript).unwrap();
    }

    #[tokio::test]
    async fn openid4vp_mdoc_session() {
        let coordinator = coordinator();
        let (id, payload) = coordinator
            .begin("openid4vp_mdoc", age_request(), ORIGIN)
            .await
            .unwrap();
        let OutboundPayload::OpenId4Vp {
            uri,
            request_object,
        } = payload
        else {
            panic!("expected an OpenID4VP payload")
        };
        assert!(uri.starts_with("mdoc-openid4vp://?client_id=x509_san_dns%3Averifier.example"));
        assert!(uri.ends_with(&format!("sessionId%3D{id}")));
        let claims = crate::crypto::jws::decode::<openid4vp::RequestObject>(&request_object)
            .unwrap()
            .claims;
        assert_eq!(claims.state, id);

        let session = coordinator.session(&id).await.unwrap();
        let apu = b64url("mdoc generated nonce");
        let apv = b64url(claims.nonce.as_bytes());
        let transcript = SessionTranscript::openid4vp(
            "x509_san_dns:verifier.example",
            &claims.response_uri,
            Some(&apv),
            Some(&apu),
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        let body = openid4vp::test::wallet_response(
            &session,
            &b64url(mdoc_response(&transcript)),
            Some(&apu),
            Some(&apv),
        );
        coordinator.deliver_response(&id, &body).await.unwrap();

        let lines = coordinator.get_data(&id).await.unwrap();
        assert_eq!(lines[0], ResultLine::new("DocType", MDL_DOCTYPE));
        assert_eq!(lines.len(), 4);
    }

    #[tokio::test]
    async fn openid4vp_vc_session() {
        let coordinator = coordinator();
        let request = lookup(CredentialFormat::Vc, EUPID_VCT, "mandatory").unwrap();
        let (id, _) = coordinator
            .begin("openid4vp_plain", request, ORIGIN)
            .await
            .unwrap();
        let session = coordinator.session(&id).await.unwrap();

        let holder = SigningKey::random(&mut rand::thread_rng());
        let presentation = sd_jwt::test::present(
            &[("given_name", json!("Erika")), ("family_name", json!("Mustermann"))],
            &holder,
            Some(("x509_san_dns:verifier.example", &session.nonce_hex())),
        );
        let body = openid4vp::test::wallet_response(&session, &presentation, None, None);
        coordinator.deliver_response(&id, &body).await.unwrap();

        let lines = coordinator.get_data(&id).await.unwrap();
        assert_eq!(lines[0], ResultLine::new("family_name", "Mustermann"));
        assert_eq!(lines[1], ResultLine::new("given_name", "Erika"));
        assert!(lines.iter().all(|line| line.key != "Key bound"));

        // A presentation bound to another verifier still renders, flagged as unbound.
        let (id, _) = coordinator
            .begin(
                "openid4vp_plain",
                lookup(CredentialFormat::Vc, EUPID_VCT, "mandatory").unwrap(),
                ORIGIN,
            )
            .await
            .unwrap();
        let session = coordinator.session(&id).await.unwrap();
        let presentation = sd_jwt::test::present(
            &[("given_name", json!("Erika"))],
            &holder,
            Some(("x509_san_dns:other.example", &session.nonce_hex())),
        );
        let body = openid4vp::test::wallet_response(&session, &presentation, None, None);
        coordinator.deliver_response(&id, &body).await.unwrap();
        let lines = coordinator.get_data(&id).await.unwrap();
        assert_eq!(lines.last(), Some(&ResultLine::new("Key bound", "false")));
    }

    #[tokio::test]
    async fn state_and_lookup_errors() {
        let coordinator = coordinator();
        assert!(matches!(
            coordinator.begin("w3c_dc_final", age_request(), ORIGIN).await,
            Err(Error::UnknownProtocol(_))
        ));
        assert!(matches!(
            coordinator.deliver_response("missing", "{}").await,
            Err(Error::MissingSession(_))
        ));
        assert!(matches!(
            coordinator.get_data("missing").await,
            Err(Error::MissingSession(_))
        ));

        let (id, _) = coordinator.begin("w3c_dc_preview", age_request(), ORIGIN).await.unwrap();
        assert!(matches!(
            coordinator.get_data(&id).await,
            Err(Error::WrongState {
                expected: "response_received",
                actual: "request_sent"
            })
        ));

        // A failed delivery leaves the session waiting for a response.
        assert!(coordinator.deliver_response(&id, r#"{"token":"AAAA"}"#).await.is_err());
        assert_eq!(coordinator.state(&id).await.unwrap().name(), "request_sent");

        let session = coordinator.session(&id).await.unwrap();
        let response = dc_api::test::seal_preview(&session, &[0xa0]);
        coordinator.deliver_response(&id, &response).await.unwrap();
        assert!(matches!(
            coordinator.deliver_response(&id, &response).await,
            Err(Error::WrongState {
                expected: "request_sent",
                actual: "response_received"
            })
        ));
    }

    #[tokio::test]
    async fn begin_rejects_unusable_requests() {
        let coordinator = coordinator();
        let vc = lookup(CredentialFormat::Vc, EUPID_VCT, "mandatory").unwrap();
        assert!(matches!(
            coordinator.begin("w3c_dc_arf", vc, ORIGIN).await,
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            coordinator.begin("openid4vp_custom", age_request(), ORIGIN).await,
            Err(Error::MissingField(field)) if field == "scheme"
        ));

        let (_, payload) = coordinator
            .begin_with(
                "openid4vp_custom",
                age_request(),
                ORIGIN,
                BeginOptions {
                    scheme: Some("haip://".into()),
                    payment: None,
                },
            )
            .await
            .unwrap();
        let OutboundPayload::OpenId4Vp { uri, .. } = payload else {
            panic!("expected an OpenID4VP payload")
        };
        assert!(uri.starts_with("haip://?client_id="));
    }

    /// Records the state of every session written to the inner store.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemorySessionStore,
        written: std::sync::Mutex<Vec<&'static str>>,
    }

    impl RecordingStore {
        fn record(&self, data: &[u8]) {
            let state = VerifierSession::from_bytes(data).unwrap().state.name();
            self.written.lock().unwrap().push(state);
        }
    }

    #[async_trait::async_trait]
    impl SessionStore for RecordingStore {
        async fn insert(
            &self,
            key: Option<String>,
            data: Vec<u8>,
            expiration: OffsetDateTime,
        ) -> Result<String, StorageError> {
            self.record(&data);
            self.inner.insert(key, data, expiration).await
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key).await
        }

        async fn update(
            &self,
            key: &str,
            data: Vec<u8>,
            expiration: OffsetDateTime,
        ) -> Result<(), StorageError> {
            self.record(&data);
            self.inner.update(key, data, expiration).await
        }
    }

    #[tokio::test]
    async fn only_sent_requests_are_stored() {
        let store = Arc::new(RecordingStore::default());
        let coordinator = VerifierSessionCoordinator::new(
            VerifierConfig::new(ORIGIN).unwrap(),
            store.clone(),
            Arc::new(ReaderRoot::generate().unwrap()),
        );
        for protocol in ["w3c_dc_preview", "w3c_dc_arf", "openid4vp_eudi"] {
            let (id, _) = coordinator.begin(protocol, age_request(), ORIGIN).await.unwrap();
            assert_eq!(coordinator.state(&id).await.unwrap().name(), "request_sent");
        }
        assert!(coordinator
            .begin("openid4vp_custom", age_request(), ORIGIN)
            .await
            .is_err());

        assert_eq!(*store.written.lock().unwrap(), vec!["request_sent"; 3]);
        assert_eq!(store.inner.len(), 3);
    }
}
