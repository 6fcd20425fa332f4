use std::io::Cursor;

use ciborium::Value;
use coset::{cbor, CoseError, EndOfFile};
use serde::{de, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CborError {
    /// CBOR decoding failure.
    #[error("CBOR decoding failure: {0}")]
    DecodeFailed(cbor::de::Error<EndOfFile>),
    /// Duplicate map key detected.
    #[error("duplicate map key")]
    DuplicateMapKey,
    /// CBOR encoding failure.
    #[error("CBOR encoding failure")]
    EncodeFailed,
    /// CBOR input had extra data.
    #[error("extraneous data")]
    ExtraneousData,
    /// Integer value on the wire is outside the range of integers representable in this crate.
    #[error("integer value out of range")]
    OutOfRangeIntegerValue,
    /// Unexpected CBOR item encountered (got, want).
    #[error("unexpected item: {0}, want {1}")]
    UnexpectedItem(&'static str, &'static str),
    /// Unrecognized value in IANA-controlled range (with no private range).
    #[error("unregistered IANA value")]
    UnregisteredIanaValue,
    /// Unrecognized value in neither IANA-controlled range nor private range.
    #[error("unregistered non-private IANA value")]
    UnregisteredIanaNonPrivateValue,
}

impl From<CoseError> for CborError {
    fn from(e: CoseError) -> Self {
        match e {
            CoseError::DecodeFailed(e) => CborError::DecodeFailed(e),
            CoseError::DuplicateMapKey => CborError::DuplicateMapKey,
            CoseError::EncodeFailed => CborError::EncodeFailed,
            CoseError::ExtraneousData => CborError::ExtraneousData,
            CoseError::OutOfRangeIntegerValue => CborError::OutOfRangeIntegerValue,
            CoseError::UnexpectedItem(s, s2) => CborError::UnexpectedItem(s, s2),
            CoseError::UnregisteredIanaValue => CborError::UnregisteredIanaValue,
            CoseError::UnregisteredIanaNonPrivateValue => {
                CborError::UnregisteredIanaNonPrivateValue
            }
        }
    }
}

pub fn to_vec<T>(value: &T) -> Result<Vec<u8>, CborError>
where
    T: Serialize,
{
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|_| CborError::EncodeFailed)?;
    Ok(buf)
}

/// Decode a single CBOR data item, rejecting trailing bytes.
pub fn from_slice<T>(slice: &[u8]) -> Result<T, CborError>
where
    T: de::DeserializeOwned,
{
    let mut cursor = Cursor::new(slice);
    let value = ciborium::from_reader(&mut cursor).map_err(|e| {
        CborError::DecodeFailed(ciborium::de::Error::Semantic(None, e.to_string()))
    })?;
    if (cursor.position() as usize) < slice.len() {
        return Err(CborError::ExtraneousData);
    }
    Ok(value)
}

/// Convert a `ciborium::Value` into a type `T`
#[allow(clippy::needless_pass_by_value)]
pub fn from_value<T>(value: Value) -> Result<T, CborError>
where
    T: de::DeserializeOwned,
{
    value.deserialized().map_err(|e| {
        CborError::DecodeFailed(ciborium::de::Error::Semantic(None, e.to_string()))
    })
}

pub fn into_value<S>(v: S) -> Result<Value, CborError>
where
    S: Serialize,
{
    Value::serialized(&v).map_err(|_| CborError::EncodeFailed)
}

/// Encode an array whose elements are already encoded data items.
///
/// The elements are copied verbatim, so an embedded structure such as a received
/// `SessionTranscript` keeps its exact byte representation.
pub fn array_of_encoded(items: &[&[u8]]) -> Vec<u8> {
    let mut out = head(4, items.len() as u64);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn head(major: u8, len: u64) -> Vec<u8> {
    let major = major << 5;
    match len {
        0..=23 => vec![major | len as u8],
        24..=0xff => vec![major | 24, len as u8],
        0x100..=0xffff => [&[major | 25][..], &(len as u16).to_be_bytes()].concat(),
        0x1_0000..=0xffff_ffff => [&[major | 26][..], &(len as u32).to_be_bytes()].concat(),
        _ => [&[major | 27][..], &len.to_be_bytes()].concat(),
    }
}

/// Look up a text key in a CBOR map.
pub fn map_get<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(k, _)| matches!(k, Value::Text(t) if t == key))
        .map(|(_, v)| v)
}

/// Render a CBOR data item in diagnostic notation.
///
/// Maps and arrays are pretty printed with two-space indentation, and byte strings are
/// shown by length only, e.g. `<1024 bytes>`.
pub fn diagnostic(value: &Value) -> String {
    let mut out = String::new();
    write_diagnostic(value, 0, &mut out);
    out
}

/// Render encoded CBOR in diagnostic notation. Bytes that do not decode render as a
/// description of the failure instead.
pub fn diagnostic_from_slice(bytes: &[u8]) -> String {
    match from_slice::<Value>(bytes) {
        Ok(value) => diagnostic(&value),
        Err(e) => format!("<malformed CBOR ({} bytes): {e}>", bytes.len()),
    }
}

fn write_diagnostic(value: &Value, indent: usize, out: &mut String) {
    let pad = |n: usize| "  ".repeat(n);
    match value {
        Value::Integer(i) => out.push_str(&i128::from(*i).to_string()),
        Value::Bytes(b) => out.push_str(&format!("<{} bytes>", b.len())),
        Value::Float(f) => out.push_str(&format!("{f:?}")),
        Value::Text(t) => out.push_str(&format!("{t:?}")),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
        Value::Tag(tag, inner) => {
            out.push_str(&format!("{tag}("));
            write_diagnostic(inner, indent, out);
            out.push(')');
        }
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Array(items) => {
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                out.push_str(&pad(indent + 1));
                write_diagnostic(item, indent + 1, out);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&pad(indent));
            out.push(']');
        }
        Value::Map(entries) if entries.is_empty() => out.push_str("{}"),
        Value::Map(entries) => {
            out.push_str("{\n");
            for (i, (k, v)) in entries.iter().enumerate() {
                out.push_str(&pad(indent + 1));
                write_diagnostic(k, indent + 1, out);
                out.push_str(": ");
                write_diagnostic(v, indent + 1, out);
                if i + 1 < entries.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&pad(indent));
            out.push('}');
        }
        _ => out.push_str("undefined"),
    }
}
