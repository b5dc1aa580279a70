//! Conversions between Rust types, record values and CBOR bytes.
//!
//! Typed records travel through `ciborium`'s value model on the way in and
//! out, so any `serde` type works as a record as long as it uses no CBOR
//! tags and its integers fit in an i64.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::Value as Cbor;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Convert any serializable type into a record value.
///
/// # Errors
///
/// Returns an error if the type contains tags or integers outside the i64
/// range.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> CodecResult<Value> {
    let raw = Cbor::serialized(value).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Value::try_from(raw)
}

/// Convert a record value back into a typed value.
///
/// # Errors
///
/// Returns an error if the value does not have the shape `T` expects.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> CodecResult<T> {
    Cbor::from(value)
        .deserialized()
        .map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Encode a record value to canonical CBOR bytes.
///
/// Map entries are already sorted inside [`Value`], so equal values always
/// produce identical bytes.
///
/// # Errors
///
/// Returns an error if the writer fails.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

/// Decode a record value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

impl TryFrom<Cbor> for Value {
    type Error = CodecError;

    fn try_from(raw: Cbor) -> CodecResult<Self> {
        let value = match raw {
            Cbor::Null => Value::Null,
            Cbor::Bool(b) => Value::Bool(b),
            Cbor::Integer(n) => {
                let wide = i128::from(n);
                Value::Integer(i64::try_from(wide).map_err(|_| CodecError::IntegerOverflow)?)
            }
            Cbor::Bytes(b) => Value::Bytes(b),
            Cbor::Text(s) => Value::Text(s),
            Cbor::Float(x) => Value::Float(x),
            Cbor::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<CodecResult<_>>()?,
            ),
            Cbor::Map(pairs) => Value::map(
                pairs
                    .into_iter()
                    .map(|(k, v)| Ok((Value::try_from(k)?, Value::try_from(v)?)))
                    .collect::<CodecResult<_>>()?,
            ),
            Cbor::Tag(tag, _) => return Err(CodecError::unsupported_type(format!("tag {tag}"))),
            other => return Err(CodecError::unsupported_type(format!("{other:?}"))),
        };
        Ok(value)
    }
}

impl From<&Value> for Cbor {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cbor::Null,
            Value::Bool(b) => Cbor::Bool(*b),
            Value::Integer(n) => Cbor::Integer((*n).into()),
            Value::Float(x) => Cbor::Float(*x),
            Value::Bytes(b) => Cbor::Bytes(b.clone()),
            Value::Text(s) => Cbor::Text(s.clone()),
            Value::Array(items) => Cbor::Array(items.iter().map(Cbor::from).collect()),
            Value::Map(pairs) => Cbor::Map(
                pairs
                    .iter()
                    .map(|(k, v)| (Cbor::from(k), Cbor::from(v)))
                    .collect(),
            ),
        }
    }
}
