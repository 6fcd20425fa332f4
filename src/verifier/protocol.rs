use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use super::Error;

/// The transports a presentation can be requested over.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display,
)]
pub enum Protocol {
    #[strum(serialize = "w3c_dc_preview")]
    #[serde(rename = "w3c_dc_preview")]
    W3cDcPreview,
    #[strum(serialize = "w3c_dc_arf")]
    #[serde(rename = "w3c_dc_arf")]
    W3cDcArf,
    #[strum(serialize = "openid4vp_plain")]
    #[serde(rename = "openid4vp_plain")]
    PlainOpenId4Vp,
    #[strum(serialize = "openid4vp_eudi")]
    #[serde(rename = "openid4vp_eudi")]
    EudiOpenId4Vp,
    #[strum(serialize = "openid4vp_mdoc")]
    #[serde(rename = "openid4vp_mdoc")]
    MdocOpenId4Vp,
    #[strum(serialize = "openid4vp_custom")]
    #[serde(rename = "openid4vp_custom")]
    CustomOpenId4Vp,
}

impl Protocol {
    pub fn parse(s: &str) -> Result<Self, Error> {
        s.parse().map_err(|_| Error::UnknownProtocol(s.to_string()))
    }

    /// Whether this is one of the W3C Digital Credentials API exchanges.
    pub fn is_dc_api(self) -> bool {
        matches!(self, Protocol::W3cDcPreview | Protocol::W3cDcArf)
    }

    /// The wallet launch scheme of an OpenID4VP protocol. The custom protocol has none.
    pub fn uri_scheme(self) -> Option<&'static str> {
        match self {
            Protocol::PlainOpenId4Vp => Some("openid4vp://"),
            Protocol::EudiOpenId4Vp => Some("eudi-openid4vp://"),
            Protocol::MdocOpenId4Vp => Some("mdoc-openid4vp://"),
            Protocol::W3cDcPreview | Protocol::W3cDcArf | Protocol::CustomOpenId4Vp => None,
        }
    }
}
