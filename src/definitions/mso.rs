use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::definitions::{helpers::ByteStr, DeviceKeyInfo, ValidityInfo};

pub type DigestId = u64;
pub type DigestIds = BTreeMap<DigestId, ByteStr>;

/// The mobile security object, signed by the issuer inside `issuerAuth`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mso {
    pub version: String,
    pub digest_algorithm: DigestAlgorithm,
    pub value_digests: BTreeMap<String, DigestIds>,
    pub device_key_info: DeviceKeyInfo,
    pub doc_type: String,
    pub validity_info: ValidityInfo,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DigestAlgorithm {
    #[serde(rename = "SHA-256")]
    SHA256,
    #[serde(rename = "SHA-384")]
    SHA384,
    #[serde(rename = "SHA-512")]
    SHA512,
}

impl DigestAlgorithm {
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::SHA256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::SHA384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::SHA512 => Sha512::digest(data).to_vec(),
        }
    }
}
