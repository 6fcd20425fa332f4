//! Support for embedded
//! [CBOR Data Items](https://www.ietf.org/rfc/rfc8949.html#name-encoded-cbor-data-item),
//! also known as a tagged data item with tag number 24.

use ciborium::Value;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

use crate::cbor::{self, CborError};

/// A wrapper for a struct that is to be encoded as a CBOR tagged item, with tag number 24.
///
/// If this struct is created through deserializing CBOR, then the original byte representation is
/// preserved for future serializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag24<T> {
    inner: T,
    pub inner_bytes: Vec<u8>,
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Expected a CBOR byte string, received: '{0:?}'")]
    InvalidTag24(Box<Value>),
    #[error("Expected a CBOR tagged data item with tag number 24, received: '{0:?}'")]
    NotATag24(Value),
    #[error("Unable to encode value as CBOR: {0}")]
    UnableToEncode(CborError),
    #[error("Unable to decode bytes to inner type: {0}")]
    UnableToDecode(CborError),
}

impl<T> Tag24<T> {
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// The full tag 24 encoding, `#6.24(bstr .cbor T)`.
    pub fn to_tagged_bytes(&self) -> Result<Vec<u8>> {
        cbor::to_vec(&Value::Tag(24, Box::new(Value::Bytes(self.inner_bytes.clone()))))
            .map_err(Error::UnableToEncode)
    }
}

impl<T: Serialize + DeserializeOwned> Tag24<T> {
    pub fn new(inner: T) -> Result<Tag24<T>> {
        let inner_bytes = cbor::to_vec(&inner).map_err(Error::UnableToEncode)?;
        let inner = cbor::from_slice(&inner_bytes).map_err(Error::UnableToDecode)?;
        Ok(Self { inner, inner_bytes })
    }

    pub fn from_bytes(inner_bytes: Vec<u8>) -> Result<Tag24<T>> {
        let inner = cbor::from_slice(&inner_bytes).map_err(Error::UnableToDecode)?;
        Ok(Self { inner, inner_bytes })
    }
}

impl<T: DeserializeOwned> TryFrom<Value> for Tag24<T> {
    type Error = Error;

    fn try_from(v: Value) -> Result<Tag24<T>> {
        match v {
            Value::Tag(24, inner_value) => match *inner_value {
                Value::Bytes(inner_bytes) => {
                    let inner = cbor::from_slice(&inner_bytes).map_err(Error::UnableToDecode)?;
                    Ok(Tag24 { inner, inner_bytes })
                }
                other => Err(Error::InvalidTag24(Box::new(other))),
            },
            _ => Err(Error::NotATag24(v)),
        }
    }
}

impl<T> From<Tag24<T>> for Value {
    fn from(Tag24 { inner_bytes, .. }: Tag24<T>) -> Value {
        Value::Tag(24, Box::new(Value::Bytes(inner_bytes)))
    }
}

impl<T> AsRef<T> for Tag24<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

impl<T> Serialize for Tag24<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Value::Tag(24, Box::new(Value::Bytes(self.inner_bytes.clone()))).serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Tag24<T> {
    fn deserialize<D>(d: D) -> std::result::Result<Tag24<T>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(d)?;
        Tag24::try_from(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::Tag24;
    use crate::cbor;

    #[test]
    fn preserves_original_bytes() {
        // Non-canonical encoding of the text "a": a 1-byte length where none is needed.
        let inner_bytes = vec![0x78, 0x01, 0x61];
        let tagged: Tag24<String> = Tag24::from_bytes(inner_bytes.clone()).unwrap();
        assert_eq!(tagged.as_ref(), "a");

        let encoded = cbor::to_vec(&tagged).unwrap();
        assert_eq!(encoded, [&[0xd8, 0x18, 0x43][..], &inner_bytes].concat());

        let decoded: Tag24<String> = cbor::from_slice(&encoded).unwrap();
        assert_eq!(decoded.inner_bytes, inner_bytes);
    }

    #[test]
    fn untagged_bytes_are_rejected() {
        let encoded = cbor::to_vec(&ciborium::Value::Bytes(vec![0x61, 0x61])).unwrap();
        assert!(cbor::from_slice::<Tag24<String>>(&encoded).is_err());
    }
}
