//! Canonical JSON encoding for deterministic hashing.
//!
//! Every hash in a bundle is taken over this encoding:
//! - Object keys sorted by byte-wise comparison of their UTF-8 encoding
//! - No insignificant whitespace
//! - Strings escaped exactly as `serde_json` escapes them
//! - Integers only (no floats)
//! - Absent optionals are absent keys, never `null`
//!
//! Key order of the input never leaks into the output, so the same record
//! produces identical bytes (and thus identical hashes) on every producer.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::digest::Sha256Digest;
use crate::error::CanonicalError;

/// Encode a serializable value to canonical JSON bytes.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value = to_value(value)?;
    canonical_json_value(&value)
}

/// Encode an already-built JSON value to canonical bytes.
pub fn canonical_json_value(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Encode a record with some top-level keys left out.
///
/// Used for receipts, whose `hash` is computed over everything but itself.
pub fn canonical_json_without<T: Serialize + ?Sized>(
    value: &T,
    excluded: &[&str],
) -> Result<Vec<u8>, CanonicalError> {
    let mut value = to_value(value)?;
    let map = value.as_object_mut().ok_or(CanonicalError::NotAnObject)?;
    for key in excluded {
        map.remove(*key);
    }
    canonical_json_value(&value)
}

/// SHA-256 of the canonical encoding.
pub fn canonical_digest<T: Serialize + ?Sized>(value: &T) -> Result<Sha256Digest, CanonicalError> {
    Ok(Sha256Digest::of(&canonical_json(value)?))
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CanonicalError> {
    serde_json::to_value(value).map_err(|e| CanonicalError::Serialize(e.to_string()))
}

/// Recursively encode a JSON value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CanonicalError> {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(true) => buf.extend_from_slice(b"true"),
        Value::Bool(false) => buf.extend_from_slice(b"false"),
        Value::Number(n) => encode_number(buf, n)?,
        Value::String(s) => encode_string(buf, s)?,
        Value::Array(arr) => encode_array(buf, arr)?,
        Value::Object(map) => encode_object_canonical(buf, map)?,
    }
    Ok(())
}

/// Integers in shortest decimal form.
fn encode_number(buf: &mut Vec<u8>, n: &Number) -> Result<(), CanonicalError> {
    if let Some(u) = n.as_u64() {
        buf.extend_from_slice(u.to_string().as_bytes());
    } else if let Some(i) = n.as_i64() {
        buf.extend_from_slice(i.to_string().as_bytes());
    } else {
        return Err(CanonicalError::FloatNotAllowed);
    }
    Ok(())
}

fn encode_string(buf: &mut Vec<u8>, s: &str) -> Result<(), CanonicalError> {
    let quoted = serde_json::to_string(s).map_err(|e| CanonicalError::Serialize(e.to_string()))?;
    buf.extend_from_slice(quoted.as_bytes());
    Ok(())
}

fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) -> Result<(), CanonicalError> {
    buf.push(b'[');
    for (i, item) in arr.iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        encode_value_to(buf, item)?;
    }
    buf.push(b']');
    Ok(())
}

/// Encode an object with keys sorted by their UTF-8 bytes.
fn encode_object_canonical(buf: &mut Vec<u8>, map: &Map<String, Value>) -> Result<(), CanonicalError> {
    let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
    pairs.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    buf.push(b'{');
    for (i, (key, value)) in pairs.into_iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        encode_string(buf, key)?;
        buf.push(b':');
        encode_value_to(buf, value)?;
    }
    buf.push(b'}');
    Ok(())
}
