use ciborium::Value as CborValue;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::cbor::map_get;

/// Validity of the mobile security object, each instant encoded as `tdate` (tag 0).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CborValue", into = "CborValue")]
pub struct ValidityInfo {
    pub signed: OffsetDateTime,
    pub valid_from: OffsetDateTime,
    pub valid_until: OffsetDateTime,
    pub expected_update: Option<OffsetDateTime>,
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("When parsing a CBOR map, could not find required field: '{0}'")]
    MissingField(&'static str),
    #[error("Expected to parse a CBOR map, received: '{0:?}'")]
    NotAMap(CborValue),
    #[error("Expected to parse a CBOR tag (number 0) holding a text string, received: '{0:?}'")]
    NotATDate(CborValue),
    #[error("Failed to parse date string as rfc3339 date: {0}")]
    UnableToParseDate(#[from] time::error::Parse),
}

impl ValidityInfo {
    /// Whether `at` lies within `validFrom..=validUntil`.
    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.valid_from <= at && at <= self.valid_until
    }
}

fn tdate(at: OffsetDateTime) -> CborValue {
    // Rfc3339 formatting only fails for years outside 0..=9999.
    let text = at
        .format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    CborValue::Tag(0, Box::new(CborValue::Text(text)))
}

impl From<ValidityInfo> for CborValue {
    fn from(v: ValidityInfo) -> CborValue {
        let mut map = vec![
            (CborValue::Text("signed".into()), tdate(v.signed)),
            (CborValue::Text("validFrom".into()), tdate(v.valid_from)),
            (CborValue::Text("validUntil".into()), tdate(v.valid_until)),
        ];
        if let Some(expected_update) = v.expected_update {
            map.push((
                CborValue::Text("expectedUpdate".into()),
                tdate(expected_update),
            ));
        }
        CborValue::Map(map)
    }
}

impl TryFrom<CborValue> for ValidityInfo {
    type Error = Error;

    fn try_from(v: CborValue) -> Result<ValidityInfo> {
        let CborValue::Map(map) = v else {
            return Err(Error::NotAMap(v));
        };
        let required = |key: &'static str| {
            map_get(&map, key)
                .ok_or(Error::MissingField(key))
                .and_then(parse_tdate)
        };
        Ok(Self {
            signed: required("signed")?,
            valid_from: required("validFrom")?,
            valid_until: required("validUntil")?,
            expected_update: map_get(&map, "expectedUpdate")
                .map(parse_tdate)
                .transpose()?,
        })
    }
}

fn parse_tdate(v: &CborValue) -> Result<OffsetDateTime> {
    match v {
        CborValue::Tag(0, inner) => match inner.as_ref() {
            CborValue::Text(s) => Ok(OffsetDateTime::parse(s, &Rfc3339)?),
            _ => Err(Error::NotATDate(v.clone())),
        },
        _ => Err(Error::NotATDate(v.clone())),
    }
}
