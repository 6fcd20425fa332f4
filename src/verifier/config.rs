use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::Error;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_CRYPTO_WORKERS: usize = 4;

/// Settings of a verifier deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierConfig {
    /// Public base URL, e.g. `https://verifier.example/server`.
    pub base_url: String,
    pub client_id: String,
    #[serde(with = "secs")]
    pub session_ttl: Duration,
    pub crypto_workers: usize,
}

impl VerifierConfig {
    /// Configuration with a client id of `x509_san_dns:` followed by the base URL without
    /// its scheme.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| Error::Configuration(format!("invalid base URL '{base_url}': {e}")))?;
        let host = base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&base_url);
        Ok(Self {
            client_id: format!("x509_san_dns:{host}"),
            base_url,
            session_ttl: DEFAULT_SESSION_TTL,
            crypto_workers: DEFAULT_CRYPTO_WORKERS,
        })
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Read `VERIFIER_BASE_URL` and the optional `VERIFIER_CLIENT_ID`,
    /// `VERIFIER_SESSION_TTL_SECS` and `VERIFIER_CRYPTO_WORKERS`.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("VERIFIER_BASE_URL")
            .map_err(|_| Error::Configuration("VERIFIER_BASE_URL is not set".into()))?;
        let mut config = Self::new(base_url)?;
        if let Some(client_id) = non_empty_var("VERIFIER_CLIENT_ID") {
            config.client_id = client_id;
        }
        if let Some(ttl) = non_empty_var("VERIFIER_SESSION_TTL_SECS") {
            let secs = ttl.parse::<u64>().map_err(|e| {
                Error::Configuration(format!("VERIFIER_SESSION_TTL_SECS '{ttl}': {e}"))
            })?;
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(workers) = non_empty_var("VERIFIER_CRYPTO_WORKERS") {
            config.crypto_workers = workers.parse::<usize>().map_err(|e| {
                Error::Configuration(format!("VERIFIER_CRYPTO_WORKERS '{workers}': {e}"))
            })?;
        }
        Ok(config)
    }

    /// Where a wallet fetches the OpenID4VP request object of a session.
    pub fn request_uri(&self, session_id: &str) -> String {
        format!("{}/verifier/openid4vpRequest?sessionId={session_id}", self.base_url)
    }

    /// Where a wallet posts its OpenID4VP response for a session.
    pub fn response_uri(&self, session_id: &str) -> String {
        format!("{}/verifier/openid4vpResponse?sessionId={session_id}", self.base_url)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
