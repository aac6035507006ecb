//! Built-in functions: size, string predicates, regex matching and type
//! conversions.

use regex_lite::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

use super::decls::OverloadDecl;
use super::env::{EnvBuilder, Library};
use super::errors::{EnvError, EvalError};
use super::types::Type;
use super::value::{format_double, Value};

lazy_static::lazy_static! {
    /// Compiled patterns for `matches`, keyed by source
    static ref REGEX_CACHE: Mutex<HashMap<String, Regex>> = Mutex::new(HashMap::new());
}

const REGEX_CACHE_LIMIT: usize = 256;

fn compile_regex(pattern: &str) -> Result<Regex, EvalError> {
    if let Ok(cache) = REGEX_CACHE.lock() {
        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }
    }
    let re = Regex::new(pattern)
        .map_err(|e| EvalError::InvalidArgument(format!("invalid regex '{}': {}", pattern, e)))?;
    if let Ok(mut cache) = REGEX_CACHE.lock() {
        if cache.len() >= REGEX_CACHE_LIMIT {
            cache.clear();
        }
        cache.insert(pattern.to_string(), re.clone());
    }
    Ok(re)
}

fn unexpected(function: &str, args: &[Value]) -> EvalError {
    let types: Vec<&str> = args.iter().map(|a| a.type_name()).collect();
    EvalError::no_overload(function, &types)
}

fn size(args: &[Value]) -> Result<Value, EvalError> {
    let n = match args {
        [Value::String(s)] => s.chars().count(),
        [Value::Bytes(b)] => b.len(),
        [Value::List(items)] => items.len(),
        [Value::Map(entries)] => entries.len(),
        _ => return Err(unexpected("size", args)),
    };
    Ok(Value::Int(n as i64))
}

fn string_predicate(
    function: &'static str,
    test: fn(&str, &str) -> bool,
) -> impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static {
    move |args| match args {
        [Value::String(s), Value::String(arg)] => Ok(Value::Bool(test(s, arg))),
        _ => Err(unexpected(function, args)),
    }
}

fn matches(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s), Value::String(pattern)] => {
            Ok(Value::Bool(compile_regex(pattern)?.is_match(s)))
        }
        _ => Err(unexpected("matches", args)),
    }
}

fn to_int(args: &[Value]) -> Result<Value, EvalError> {
    let range = || EvalError::Overflow("int".to_string());
    match args {
        [Value::Int(i)] => Ok(Value::Int(*i)),
        [Value::UInt(u)] => i64::try_from(*u).map(Value::Int).map_err(|_| range()),
        [Value::Double(d)] => {
            // i64::MAX is not exactly representable, so the upper bound is exclusive
            if d.is_finite() && *d >= -9.223_372_036_854_775_808e18 && *d < 9.223_372_036_854_775_808e18 {
                Ok(Value::Int(d.trunc() as i64))
            } else {
                Err(range())
            }
        }
        [Value::String(s)] => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::InvalidArgument(format!("cannot convert {:?} to int", s))),
        [Value::Bool(b)] => Ok(Value::Int(*b as i64)),
        _ => Err(unexpected("int", args)),
    }
}

fn to_uint(args: &[Value]) -> Result<Value, EvalError> {
    let range = || EvalError::Overflow("uint".to_string());
    match args {
        [Value::UInt(u)] => Ok(Value::UInt(*u)),
        [Value::Int(i)] => u64::try_from(*i).map(Value::UInt).map_err(|_| range()),
        [Value::Double(d)] => {
            if d.is_finite() && *d >= 0.0 && *d < 1.844_674_407_370_955_2e19 {
                Ok(Value::UInt(d.trunc() as u64))
            } else {
                Err(range())
            }
        }
        [Value::String(s)] => s
            .parse::<u64>()
            .map(Value::UInt)
            .map_err(|_| EvalError::InvalidArgument(format!("cannot convert {:?} to uint", s))),
        _ => Err(unexpected("uint", args)),
    }
}

fn to_double(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::Double(d)] => Ok(Value::Double(*d)),
        [Value::Int(i)] => Ok(Value::Double(*i as f64)),
        [Value::UInt(u)] => Ok(Value::Double(*u as f64)),
        [Value::String(s)] => s
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| EvalError::InvalidArgument(format!("cannot convert {:?} to double", s))),
        _ => Err(unexpected("double", args)),
    }
}

fn to_string(args: &[Value]) -> Result<Value, EvalError> {
    let s = match args {
        [Value::String(s)] => s.clone(),
        [Value::Int(i)] => i.to_string(),
        [Value::UInt(u)] => u.to_string(),
        [Value::Double(d)] => format_double(*d),
        [Value::Bool(b)] => b.to_string(),
        [Value::Bytes(b)] => String::from_utf8(b.clone())
            .map_err(|_| EvalError::InvalidArgument("invalid UTF-8 in bytes".to_string()))?,
        _ => return Err(unexpected("string", args)),
    };
    Ok(Value::String(s))
}

fn to_bytes(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::Bytes(b)] => Ok(Value::Bytes(b.clone())),
        [Value::String(s)] => Ok(Value::Bytes(s.as_bytes().to_vec())),
        _ => Err(unexpected("bytes", args)),
    }
}

fn to_bool(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::Bool(b)] => Ok(Value::Bool(*b)),
        [Value::String(s)] => match s.as_str() {
            "1" | "t" | "true" | "TRUE" | "True" => Ok(Value::Bool(true)),
            "0" | "f" | "false" | "FALSE" | "False" => Ok(Value::Bool(false)),
            _ => Err(EvalError::InvalidArgument(format!("cannot convert {:?} to bool", s))),
        },
        _ => Err(unexpected("bool", args)),
    }
}

fn identity(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [v] => Ok(v.clone()),
        _ => Err(unexpected("dyn", args)),
    }
}

/// Functions every environment gets
pub struct StandardLibrary;

impl Library for StandardLibrary {
    fn name(&self) -> &str {
        "standard"
    }

    fn install(&self, env: &mut EnvBuilder) -> Result<(), EnvError> {
        let sizeable = [
            ("string", Type::String),
            ("bytes", Type::Bytes),
            ("list", Type::list(Type::Dyn)),
            ("map", Type::map(Type::Dyn, Type::Dyn)),
        ];
        let mut size_overloads = Vec::new();
        for (name, ty) in sizeable {
            size_overloads.push(
                OverloadDecl::global(&format!("size_{}", name), vec![ty.clone()], Type::Int)
                    .with_impl(size),
            );
            size_overloads.push(
                OverloadDecl::member(&format!("{}_size", name), vec![ty], Type::Int)
                    .with_impl(size),
            );
        }
        env.function("size", size_overloads)?;

        let predicates: [(&'static str, &str, fn(&str, &str) -> bool); 3] = [
            ("contains", "contains_string", |s, arg| s.contains(arg)),
            ("startsWith", "starts_with_string", |s, arg| s.starts_with(arg)),
            ("endsWith", "ends_with_string", |s, arg| s.ends_with(arg)),
        ];
        for (function, id, test) in predicates {
            env.function(
                function,
                vec![OverloadDecl::member(id, vec![Type::String, Type::String], Type::Bool)
                    .with_impl(string_predicate(function, test))],
            )?;
        }

        env.function(
            "matches",
            vec![
                OverloadDecl::global("matches", vec![Type::String, Type::String], Type::Bool)
                    .with_impl(matches),
                OverloadDecl::member("matches_string", vec![Type::String, Type::String], Type::Bool)
                    .with_impl(matches),
            ],
        )?;

        let conversions: [(&str, Type, &[Type], fn(&[Value]) -> Result<Value, EvalError>); 6] = [
            ("int", Type::Int, &[Type::Int, Type::UInt, Type::Double, Type::String, Type::Bool], to_int),
            ("uint", Type::UInt, &[Type::UInt, Type::Int, Type::Double, Type::String], to_uint),
            ("double", Type::Double, &[Type::Double, Type::Int, Type::UInt, Type::String], to_double),
            (
                "string",
                Type::String,
                &[Type::String, Type::Int, Type::UInt, Type::Double, Type::Bool, Type::Bytes],
                to_string,
            ),
            ("bytes", Type::Bytes, &[Type::Bytes, Type::String], to_bytes),
            ("bool", Type::Bool, &[Type::Bool, Type::String], to_bool),
        ];
        for (function, result, sources, f) in conversions {
            let overloads = sources
                .iter()
                .map(|source| {
                    OverloadDecl::global(
                        &format!("{}_to_{}", source, function),
                        vec![source.clone()],
                        result.clone(),
                    )
                    .with_impl(f)
                })
                .collect();
            env.function(function, overloads)?;
        }

        env.function(
            "dyn",
            vec![OverloadDecl::global("to_dyn", vec![Type::Dyn], Type::Dyn).with_impl(identity)],
        )
    }
}
