//! Request-scoped extension functions: header helpers, encoding helpers and
//! secret comparison.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use indexmap::IndexMap;
use serde::Deserialize;
use std::sync::Arc;

use super::http::canonical_header_key;
use super::serialize::to_json;
use crate::cel::{EnvBuilder, EnvError, EvalError, Key, Library, OverloadDecl, Type, Value};

/// Read-only access to named secrets, looked up by namespace, secret name
/// and key. Shared across concurrent runs.
pub trait SecretStore: Send + Sync {
    fn get(&self, namespace: &str, name: &str, key: &str) -> Option<Vec<u8>>;
}

/// In-memory secrets: namespace -> secret name -> key -> value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct StaticSecretStore {
    secrets: IndexMap<String, IndexMap<String, IndexMap<String, String>>>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: &str, name: &str, key: &str, value: impl Into<String>) {
        self.secrets
            .entry(namespace.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl SecretStore for StaticSecretStore {
    fn get(&self, namespace: &str, name: &str, key: &str) -> Option<Vec<u8>> {
        self.secrets
            .get(namespace)?
            .get(name)?
            .get(key)
            .map(|v| v.as_bytes().to_vec())
    }
}

/// Compare without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn invalid(function: &str, args: &[Value]) -> EvalError {
    let types: Vec<&str> = args.iter().map(|a| a.type_name()).collect();
    EvalError::no_overload(function, &types)
}

fn header_lookup<'a>(headers: &'a IndexMap<Key, Value>, name: &str) -> Vec<&'a str> {
    let wanted = canonical_header_key(name);
    let values = headers
        .iter()
        .find(|(k, _)| matches!(k, Key::String(s) if canonical_header_key(s) == wanted))
        .map(|(_, v)| v);
    match values {
        Some(Value::List(items)) => items.iter().filter_map(|v| v.as_str()).collect(),
        Some(Value::String(s)) => vec![s.as_str()],
        _ => Vec::new(),
    }
}

fn match_header(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::Map(headers), Value::String(name), Value::String(value)] => Ok(Value::Bool(
            header_lookup(headers, name).iter().any(|v| v == value),
        )),
        _ => Err(invalid("match", args)),
    }
}

fn canonical_header(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::Map(headers), Value::String(name)] => Ok(Value::from(
            header_lookup(headers, name).first().copied().unwrap_or(""),
        )),
        _ => Err(invalid("canonical", args)),
    }
}

fn truncate(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s), Value::Int(n)] => {
            let n = usize::try_from(*n).map_err(|_| {
                EvalError::InvalidArgument(format!("truncate: negative length {}", n))
            })?;
            Ok(Value::String(s.chars().take(n).collect()))
        }
        _ => Err(invalid("truncate", args)),
    }
}

/// Standard alphabet first, then URL-safe. Valid UTF-8 comes back as a
/// string, anything else as bytes.
fn decode_b64(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s)] => {
            let decoded = STANDARD
                .decode(s.trim())
                .or_else(|_| URL_SAFE.decode(s.trim()))
                .map_err(|e| EvalError::InvalidArgument(format!("failed to decode base64: {}", e)))?;
            Ok(match String::from_utf8(decoded) {
                Ok(text) => Value::String(text),
                Err(e) => Value::Bytes(e.into_bytes()),
            })
        }
        _ => Err(invalid("decodeb64", args)),
    }
}

fn parse_json(args: &[Value]) -> Result<Value, EvalError> {
    let raw = match args {
        [Value::String(s)] => s.as_bytes(),
        [Value::Bytes(b)] => b.as_slice(),
        _ => return Err(invalid("parseJSON", args)),
    };
    serde_json::from_slice::<serde_json::Value>(raw)
        .map(Value::from_json)
        .map_err(|e| EvalError::InvalidArgument(format!("failed to parse JSON: {}", e)))
}

fn yaml_key(k: serde_yaml::Value) -> Key {
    match k {
        serde_yaml::Value::String(s) => Key::String(s),
        serde_yaml::Value::Bool(b) => Key::Bool(b),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Key::Int(i),
            None => Key::String(n.to_string()),
        },
        serde_yaml::Value::Null => Key::String("null".to_string()),
        other => Key::String(format!("{:?}", other)),
    }
}

fn yaml_to_value(v: serde_yaml::Value) -> Value {
    match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                n.as_f64().map_or(Value::Null, Value::Double)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::from(items.into_iter().map(yaml_to_value).collect::<Vec<_>>())
        }
        serde_yaml::Value::Mapping(map) => {
            let entries: IndexMap<Key, Value> = map
                .into_iter()
                .map(|(k, v)| (yaml_key(k), yaml_to_value(v)))
                .collect();
            Value::from(entries)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_value(tagged.value),
    }
}

fn parse_yaml(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s)] => serde_yaml::from_str::<serde_yaml::Value>(s)
            .map(yaml_to_value)
            .map_err(|e| EvalError::InvalidArgument(format!("failed to parse YAML: {}", e))),
        _ => Err(invalid("parseYAML", args)),
    }
}

fn marshal_json(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [v] => {
            let json = to_json(v).map_err(|e| EvalError::InvalidArgument(e.to_string()))?;
            serde_json::to_string(&json)
                .map(Value::String)
                .map_err(|e| EvalError::InvalidArgument(e.to_string()))
        }
        _ => Err(invalid("marshalJSON", args)),
    }
}

fn list_end(function: &'static str, last: bool) -> impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync {
    move |args| match args {
        [Value::List(items)] => {
            let item = if last { items.last() } else { items.first() };
            item.cloned().ok_or_else(|| {
                EvalError::InvalidArgument(format!("{}() called on an empty list", function))
            })
        }
        _ => Err(invalid(function, args)),
    }
}

/// Functions contributed per request. `compareSecret` resolves secrets in
/// `namespace` unless the call names one.
pub struct TriggersLibrary {
    namespace: String,
    secrets: Arc<dyn SecretStore>,
}

impl TriggersLibrary {
    pub fn new(namespace: impl Into<String>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            namespace: namespace.into(),
            secrets,
        }
    }

    fn compare_secret(&self) -> impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync {
        let default_namespace = self.namespace.clone();
        let secrets = Arc::clone(&self.secrets);
        move |args| {
            let (value, key, name, namespace) = match args {
                [Value::String(v), Value::String(k), Value::String(n)] => {
                    (v, k, n, default_namespace.as_str())
                }
                [Value::String(v), Value::String(k), Value::String(n), Value::String(ns)] => {
                    (v, k, n, ns.as_str())
                }
                _ => return Err(invalid("compareSecret", args)),
            };
            let secret = secrets.get(namespace, name, key).ok_or_else(|| {
                EvalError::InvalidArgument(format!(
                    "failed to find secret '{}' key '{}' in namespace '{}'",
                    name, key, namespace
                ))
            })?;
            Ok(Value::Bool(constant_time_eq(value.as_bytes(), &secret)))
        }
    }
}

impl Library for TriggersLibrary {
    fn name(&self) -> &str {
        "triggers"
    }

    fn install(&self, env: &mut EnvBuilder) -> Result<(), EnvError> {
        use Type::{Bool, Dyn, Int, String as Str};
        if self.namespace.is_empty() {
            return Err(EnvError::Library {
                library: self.name().to_string(),
                message: "namespace must not be empty".to_string(),
            });
        }
        let headers = || Type::map(Str, Dyn);
        let member = OverloadDecl::member;

        env.function(
            "match",
            vec![member("match_headers_string_string", vec![headers(), Str, Str], Bool)
                .with_impl(match_header)],
        )?;
        env.function(
            "canonical",
            vec![member("canonical_headers_string", vec![headers(), Str], Str)
                .with_impl(canonical_header)],
        )?;
        env.function(
            "truncate",
            vec![member("truncate_string_int", vec![Str, Int], Str).with_impl(truncate)],
        )?;
        env.function(
            "decodeb64",
            vec![member("decodeb64_string", vec![Str], Dyn).with_impl(decode_b64)],
        )?;
        env.function(
            "parseJSON",
            vec![
                member("parse_json_string", vec![Str], Dyn).with_impl(parse_json),
                member("parse_json_bytes", vec![Type::Bytes], Dyn).with_impl(parse_json),
            ],
        )?;
        env.function(
            "parseYAML",
            vec![member("parse_yaml_string", vec![Str], Dyn).with_impl(parse_yaml)],
        )?;
        env.function(
            "marshalJSON",
            vec![member("marshal_json_dyn", vec![Dyn], Str).with_impl(marshal_json)],
        )?;
        env.function(
            "first",
            vec![member("first_list", vec![Type::list(Dyn)], Dyn).with_impl(list_end("first", false))],
        )?;
        env.function(
            "last",
            vec![member("last_list", vec![Type::list(Dyn)], Dyn).with_impl(list_end("last", true))],
        )?;
        env.function(
            "compareSecret",
            vec![
                member("compare_secret_string_string_string", vec![Str, Str, Str], Bool)
                    .with_impl(self.compare_secret()),
                member("compare_secret_string_string_string_string", vec![Str, Str, Str, Str], Bool)
                    .with_impl(self.compare_secret()),
            ],
        )?;

        Ok(())
    }
}
