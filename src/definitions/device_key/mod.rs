use ciborium::Value;
use serde::{Deserialize, Serialize};

pub mod cose_key;
pub use cose_key::CoseKey;

/// Device key information carried in the MSO.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceKeyInfo {
    pub device_key: CoseKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_authorizations: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_info: Option<Value>,
}
