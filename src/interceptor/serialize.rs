//! Expression results to JSON bytes.
//!
//! Scalars are dispatched before lists and maps; nested values inside a list
//! or map use the structural encoding of [`to_json`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Number};
use thiserror::Error;

use crate::cel::{Key, Value};

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("{0} is not representable as a JSON number")]
    NonFinite(f64),

    #[error("map key {0} is not a string")]
    NonStringKey(String),

    #[error("null has no byte representation")]
    Null,

    #[error("bytes result is not valid JSON: {0}")]
    RawBytes(#[source] serde_json::Error),

    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

/// Integers stay integers; integral doubles below 1e18 render without a
/// fraction, everything else keeps full precision.
pub fn number(value: &Value) -> Option<Result<Number, SerializeError>> {
    Some(match value {
        Value::Int(i) => Ok(Number::from(*i)),
        Value::UInt(u) => Ok(Number::from(*u)),
        Value::Double(d) => double(*d),
        _ => return None,
    })
}

fn double(d: f64) -> Result<Number, SerializeError> {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e18 {
        return Ok(Number::from(d as i64));
    }
    Number::from_f64(d).ok_or(SerializeError::NonFinite(d))
}

/// Structural encoding used for list elements, map values and `marshalJSON`.
pub fn to_json(value: &Value) -> Result<serde_json::Value, SerializeError> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(_) | Value::UInt(_) | Value::Double(_) => match number(value) {
            Some(n) => serde_json::Value::Number(n?),
            None => serde_json::Value::Null,
        },
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(BASE64.encode(b)),
        Value::List(items) => serde_json::Value::Array(
            items.iter().map(to_json).collect::<Result<_, _>>()?,
        ),
        Value::Map(entries) => {
            let mut obj = Map::new();
            for (k, v) in entries.iter() {
                match k {
                    Key::String(s) => {
                        obj.insert(s.clone(), to_json(v)?);
                    }
                    other => return Err(SerializeError::NonStringKey(other.to_string())),
                }
            }
            serde_json::Value::Object(obj)
        }
    })
}

/// JSON bytes for an overlay result.
pub fn serialize(value: &Value) -> Result<Vec<u8>, SerializeError> {
    if let Value::String(s) = value {
        return Ok(serde_json::to_vec(s)?);
    }
    if let Some(n) = number(value) {
        return Ok(serde_json::to_vec(&n?)?);
    }
    match value {
        Value::Bool(b) => Ok(serde_json::to_vec(b)?),
        Value::List(_) | Value::Map(_) => Ok(serde_json::to_vec(&to_json(value)?)?),
        Value::Bytes(raw) => {
            serde_json::from_slice::<serde::de::IgnoredAny>(raw).map_err(SerializeError::RawBytes)?;
            Ok(raw.clone())
        }
        _ => Err(SerializeError::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn text(v: Value) -> String {
        String::from_utf8(serialize(&v).unwrap()).unwrap()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(text(Value::from("hello")), r#""hello""#);
        assert_eq!(text(Value::from("quote\"d")), r#""quote\"d""#);
        assert_eq!(text(Value::Int(5)), "5");
        assert_eq!(text(Value::Int(-7)), "-7");
        assert_eq!(text(Value::UInt(18446744073709551615)), "18446744073709551615");
        assert_eq!(text(Value::Double(3.14)), "3.14");
        assert_eq!(text(Value::Double(2.0)), "2");
        assert_eq!(text(Value::Bool(true)), "true");
    }

    #[test]
    fn test_non_finite_double() {
        assert!(matches!(serialize(&Value::Double(f64::NAN)), Err(SerializeError::NonFinite(_))));
        assert!(serialize(&Value::Double(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_nested_structures() {
        let mut inner = IndexMap::new();
        inner.insert(Key::from("n"), Value::Double(1.5));
        inner.insert(Key::from("raw"), Value::Bytes(b"hi".to_vec()));
        inner.insert(Key::from("none"), Value::Null);
        let v = Value::from(vec![
            Value::Int(1),
            Value::from("two"),
            Value::Map(Arc::new(inner)),
            Value::from(vec![Value::Bool(false)]),
        ]);
        assert_eq!(text(v), r#"[1,"two",{"n":1.5,"raw":"aGk=","none":null},[false]]"#);
    }

    #[test]
    fn test_non_string_map_keys_rejected() {
        let mut m = IndexMap::new();
        m.insert(Key::Int(1), Value::Int(2));
        assert!(matches!(
            serialize(&Value::Map(Arc::new(m))),
            Err(SerializeError::NonStringKey(_))
        ));
    }

    #[test]
    fn test_bytes_pass_through_when_json() {
        assert_eq!(text(Value::Bytes(br#"{"a": 1}"#.to_vec())), r#"{"a": 1}"#);
        assert!(matches!(
            serialize(&Value::Bytes(b"not json".to_vec())),
            Err(SerializeError::RawBytes(_))
        ));
    }

    #[test]
    fn test_null_has_no_bytes() {
        assert!(matches!(serialize(&Value::Null), Err(SerializeError::Null)));
        assert_eq!(to_json(&Value::Null).unwrap(), serde_json::Value::Null);
    }
}
