//! SD-JWT VC presentations (`<issuer-jwt>~<disclosure>~...~<kb-jwt>`).
//!
//! The issuer signature is not checked: no issuer trust list exists for this format.
//! Every disclosure must be committed to by a `_sd` (or array `...`) digest of the
//! issuer-signed claims or of another disclosure. Key binding is checked against the `cnf`
//! key of the issuer-signed claims.
use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::Error;
use crate::crypto::{b64url, b64url_decode, jws, PublicKeyJwk};

const SEPARATOR: char = '~';
const SD_ALG: &str = "sha-256";

/// A selectively disclosed claim, `[salt, name, value]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Disclosure {
    pub salt: String,
    pub key: String,
    pub value: Value,
}

impl Disclosure {
    fn decode(encoded: &str) -> Result<Value, Error> {
        serde_json::from_slice(&b64url_decode(encoded)?)
            .map_err(|e| Error::SdJwt(format!("disclosure is not JSON: {e}")))
    }

    fn from_value(decoded: Value) -> Result<Option<Self>, Error> {
        match decoded {
            Value::Array(mut parts) if parts.len() == 3 => {
                let value = parts.remove(2);
                let key = parts.remove(1);
                let salt = parts.remove(0);
                match (salt, key) {
                    (Value::String(salt), Value::String(key)) => Ok(Some(Self { salt, key, value })),
                    _ => Err(Error::SdJwt("disclosure salt and name must be strings".into())),
                }
            }
            // Array element disclosures carry no claim name.
            Value::Array(parts) if parts.len() == 2 => Ok(None),
            _ => Err(Error::SdJwt("disclosure is not a 2 or 3 element array".into())),
        }
    }

    /// The displayed form of the value: primitives as their plain content, arrays as JSON.
    pub fn display_value(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null | Value::Bool(_) | Value::Number(_) => self.value.to_string(),
            Value::Array(_) => self.value.to_string(),
            Value::Object(_) => format!("Unknown Response Type: {}", self.value),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    pub jwk: PublicKeyJwk,
}

/// The claims of the issuer-signed JWT that are shown alongside the disclosures.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuerClaims {
    pub iss: Option<String>,
    pub vct: Option<String>,
    pub iat: Option<i64>,
    pub nbf: Option<i64>,
    pub exp: Option<i64>,
    pub cnf: Option<Confirmation>,
}

#[derive(Debug, Clone, Deserialize)]
struct KeyBindingClaims {
    aud: String,
    nonce: String,
    #[serde(default)]
    sd_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SdJwtPresentation {
    claims: IssuerClaims,
    disclosures: Vec<Disclosure>,
    /// Everything up to and including the last separator, the input of `sd_hash`.
    presented: String,
    key_binding_jwt: Option<String>,
}

impl SdJwtPresentation {
    pub fn parse(presentation: &str) -> Result<Self, Error> {
        let presentation = presentation.trim();
        let split = presentation
            .rfind(SEPARATOR)
            .ok_or_else(|| Error::SdJwt("no disclosure separator".into()))?;
        let (presented, key_binding_jwt) = presentation.split_at(split + 1);

        let mut parts = presented.split(SEPARATOR);
        let issuer_jwt = parts
            .next()
            .filter(|jwt| !jwt.is_empty())
            .ok_or_else(|| Error::SdJwt("missing issuer-signed JWT".into()))?;
        let claims = issuer_jwt
            .split('.')
            .nth(1)
            .ok_or_else(|| Error::SdJwt("issuer-signed JWT is malformed".into()))?;
        let payload: Value = serde_json::from_slice(&b64url_decode(claims)?)
            .map_err(|e| Error::SdJwt(format!("issuer-signed claims: {e}")))?;
        match payload.get("_sd_alg") {
            None => {}
            Some(Value::String(alg)) if alg == SD_ALG => {}
            Some(alg) => return Err(Error::SdJwt(format!("unsupported _sd_alg {alg}"))),
        }

        let mut committed = HashSet::new();
        collect_digests(&payload, &mut committed);
        let mut decoded = Vec::new();
        for encoded in parts.filter(|d| !d.is_empty()) {
            let value = Disclosure::decode(encoded)?;
            if let Some(disclosed) = value.as_array().and_then(|parts| parts.last()) {
                collect_digests(disclosed, &mut committed);
            }
            decoded.push((digest(encoded), value));
        }

        let mut seen = HashSet::new();
        let mut disclosures = Vec::new();
        for (digest, value) in decoded {
            if !committed.contains(&digest) {
                return Err(Error::SdJwt(format!("disclosure {digest} is not committed to")));
            }
            if !seen.insert(digest.clone()) {
                return Err(Error::SdJwt(format!("disclosure {digest} is repeated")));
            }
            if let Some(disclosure) = Disclosure::from_value(value)? {
                disclosures.push(disclosure);
            }
        }
        let claims: IssuerClaims = serde_json::from_value(payload)
            .map_err(|e| Error::SdJwt(format!("issuer-signed claims: {e}")))?;

        Ok(Self {
            claims,
            disclosures,
            presented: presented.to_string(),
            key_binding_jwt: Some(key_binding_jwt.to_string()).filter(|jwt| !jwt.is_empty()),
        })
    }

    pub fn claims(&self) -> &IssuerClaims {
        &self.claims
    }

    pub fn disclosures(&self) -> &[Disclosure] {
        &self.disclosures
    }

    /// Check the key binding JWT: signed by the `cnf` key, addressed to `audience`,
    /// carrying `nonce` and, when present, the hash of the presented SD-JWT.
    pub fn verify_key_binding(&self, audience: &str, nonce: &str) -> Result<(), Error> {
        let token = self
            .key_binding_jwt
            .as_deref()
            .ok_or_else(|| Error::SdJwt("no key binding JWT".into()))?;
        let holder_key = self
            .claims
            .cnf
            .as_ref()
            .ok_or_else(|| Error::SdJwt("no cnf key in the issuer-signed claims".into()))?
            .jwk
            .to_public_key()?;

        let kb = jws::decode::<KeyBindingClaims>(token)?;
        kb.verify(&p256::ecdsa::VerifyingKey::from(&holder_key))?;
        if kb.claims.aud != audience {
            return Err(Error::SdJwt(format!("key binding audience '{}'", kb.claims.aud)));
        }
        if kb.claims.nonce != nonce {
            return Err(Error::SdJwt("key binding nonce does not match".into()));
        }
        if let Some(sd_hash) = &kb.claims.sd_hash {
            if *sd_hash != b64url(Sha256::digest(self.presented.as_bytes())) {
                return Err(Error::SdJwt("key binding sd_hash does not match".into()));
            }
        }
        Ok(())
    }

    /// Disclosures sorted by name, then the registered claims that are present.
    pub fn display_lines(&self) -> Result<Vec<(String, String)>, Error> {
        let mut disclosures: Vec<&Disclosure> = self.disclosures.iter().collect();
        disclosures.sort_by(|a, b| a.key.cmp(&b.key));
        let mut lines: Vec<(String, String)> = disclosures
            .into_iter()
            .map(|d| (d.key.clone(), d.display_value()))
            .collect();

        let claims = &self.claims;
        let special = [
            ("iss", claims.iss.clone()),
            ("vct", claims.vct.clone()),
            ("iat", claims.iat.map(format_time).transpose()?),
            ("nbf", claims.nbf.map(format_time).transpose()?),
            ("exp", claims.exp.map(format_time).transpose()?),
            (
                "cnf",
                claims
                    .cnf
                    .as_ref()
                    .map(|cnf| serde_json::to_string(&cnf.jwk))
                    .transpose()
                    .map_err(crate::crypto::Error::from)?,
            ),
        ];
        for (key, value) in special {
            if let Some(value) = value {
                tracing::debug!("adding registered claim {key}: {value}");
                lines.push((key.to_string(), value));
            }
        }
        Ok(lines)
    }
}

fn digest(encoded: &str) -> String {
    b64url(Sha256::digest(encoded.as_bytes()))
}

/// Gather the digests in `_sd` arrays and `{"...": digest}` array elements, at any depth.
fn collect_digests(value: &Value, digests: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                match (key.as_str(), value) {
                    ("_sd", Value::Array(sd)) => {
                        digests.extend(sd.iter().filter_map(Value::as_str).map(str::to_string))
                    }
                    ("...", Value::String(d)) => {
                        digests.insert(d.clone());
                    }
                    _ => collect_digests(value, digests),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_digests(item, digests)),
        _ => {}
    }
}

fn format_time(seconds: i64) -> Result<String, Error> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| Error::SdJwt(format!("timestamp {seconds}: {e}")))?
        .format(&Rfc3339)
        .map_err(|e| Error::SdJwt(format!("timestamp {seconds}: {e}")))
}
