//! Structural JSON patching: set a JSON-encoded value at an overlay key
//! inside a JSON document.

pub mod path;

use serde_json::{Map, Value};
use thiserror::Error;

pub use path::{parse_path, PathElement};

/// How far past the end of an array an index may reach; the gap is padded
/// with nulls.
pub const MAX_ARRAY_GAP: usize = 1024;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("invalid overlay path '{path}': {reason}")]
    Path { path: String, reason: String },

    #[error("document is not valid JSON: {0}")]
    Document(#[source] serde_json::Error),

    #[error("value is not valid JSON: {0}")]
    Value(#[source] serde_json::Error),
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Set `value` at `path` in `document`, returning the new document.
///
/// Intermediate objects and arrays are created as needed; existing keys keep
/// their order and an existing value at `path` is replaced.
pub fn patch(document: &[u8], path: &str, value: &[u8]) -> Result<Vec<u8>, PatchError> {
    let elements = parse_path(path)?;
    let mut doc: Value = serde_json::from_slice(document).map_err(PatchError::Document)?;
    let value: Value = serde_json::from_slice(value).map_err(PatchError::Value)?;
    set_path(&mut doc, &elements, value).map_err(|reason| PatchError::Path {
        path: path.to_string(),
        reason,
    })?;
    serde_json::to_vec(&doc).map_err(PatchError::Document)
}

/// Set `new_val` at `path` inside `value` in place. Errors describe where
/// the path stopped making sense.
pub fn set_path(value: &mut Value, path: &[PathElement], new_val: Value) -> Result<(), String> {
    let mut current = value;
    for (depth, element) in path.iter().enumerate() {
        if current.is_null() {
            *current = match element {
                PathElement::Key(_) => Value::Object(Map::new()),
                PathElement::Index(_) | PathElement::Numeric(_) => Value::Array(Vec::new()),
            };
        }
        let at = || {
            let prefix: Vec<String> = path[..depth].iter().map(|e| e.to_string()).collect();
            if prefix.is_empty() {
                "the document root".to_string()
            } else {
                format!("'{}'", prefix.join("."))
            }
        };
        current = match (element, current) {
            (PathElement::Key(key), Value::Object(obj)) => {
                obj.entry(key.clone()).or_insert(Value::Null)
            }
            (PathElement::Numeric(index), Value::Object(obj)) => {
                obj.entry(index.to_string()).or_insert(Value::Null)
            }
            (PathElement::Index(index) | PathElement::Numeric(index), Value::Array(arr)) => {
                if index.saturating_sub(arr.len()) > MAX_ARRAY_GAP {
                    return Err(format!(
                        "index [{}] is more than {} past the end of the array at {}",
                        index,
                        MAX_ARRAY_GAP,
                        at()
                    ));
                }
                if arr.len() <= *index {
                    let len = index
                        .checked_add(1)
                        .ok_or_else(|| format!("index [{}] is out of range", index))?;
                    arr.resize(len, Value::Null);
                }
                &mut arr[*index]
            }
            (PathElement::Key(key), Value::Array(_)) => {
                return Err(format!("cannot set key '{}' on the array at {}", key, at()))
            }
            (PathElement::Index(index), Value::Object(_)) => {
                return Err(format!("cannot index [{}] into the object at {}", index, at()))
            }
            (element, scalar) => {
                return Err(format!(
                    "cannot traverse {} at {} to reach '{}'",
                    json_type(scalar),
                    at(),
                    element
                ))
            }
        };
    }
    *current = new_val;
    Ok(())
}
