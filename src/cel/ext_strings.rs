//! String extension functions. Indices and lengths count Unicode code points.

use std::sync::Arc;

use super::decls::OverloadDecl;
use super::env::{EnvBuilder, Library};
use super::errors::{EnvError, EvalError};
use super::types::Type;
use super::value::Value;

fn invalid(function: &str, args: &[Value]) -> EvalError {
    let types: Vec<&str> = args.iter().map(|a| a.type_name()).collect();
    EvalError::no_overload(function, &types)
}

fn out_of_range(index: i64, size: usize) -> EvalError {
    EvalError::IndexOutOfRange { index, size }
}

fn char_at(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s), Value::Int(i)] => {
            let chars: Vec<char> = s.chars().collect();
            match usize::try_from(*i) {
                Ok(idx) if idx < chars.len() => Ok(Value::String(chars[idx].to_string())),
                Ok(idx) if idx == chars.len() => Ok(Value::String(String::new())),
                _ => Err(out_of_range(*i, chars.len())),
            }
        }
        _ => Err(invalid("charAt", args)),
    }
}

/// Position of `needle` in `hay` at or after `from`, in code points.
fn find_from(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from);
    }
    (from..hay.len()).find(|&i| hay[i..].starts_with(needle))
}

fn index_of(args: &[Value]) -> Result<Value, EvalError> {
    let (s, sub, offset) = match args {
        [Value::String(s), Value::String(sub)] => (s, sub, 0),
        [Value::String(s), Value::String(sub), Value::Int(o)] => (s, sub, *o),
        _ => return Err(invalid("indexOf", args)),
    };
    let hay: Vec<char> = s.chars().collect();
    let needle: Vec<char> = sub.chars().collect();
    let from = usize::try_from(offset)
        .ok()
        .filter(|&o| o <= hay.len())
        .ok_or_else(|| out_of_range(offset, hay.len()))?;
    Ok(Value::Int(find_from(&hay, &needle, from).map_or(-1, |i| i as i64)))
}

fn last_index_of(args: &[Value]) -> Result<Value, EvalError> {
    let (s, sub, offset) = match args {
        [Value::String(s), Value::String(sub)] => (s, sub, None),
        [Value::String(s), Value::String(sub), Value::Int(o)] => (s, sub, Some(*o)),
        _ => return Err(invalid("lastIndexOf", args)),
    };
    let hay: Vec<char> = s.chars().collect();
    let needle: Vec<char> = sub.chars().collect();
    let last_start = match offset {
        None => hay.len(),
        Some(o) => usize::try_from(o)
            .ok()
            .filter(|&o| o <= hay.len())
            .ok_or_else(|| out_of_range(o, hay.len()))?,
    };
    if needle.is_empty() {
        return Ok(Value::Int(last_start as i64));
    }
    let found = (0..=last_start)
        .rev()
        .find(|&i| i + needle.len() <= hay.len() && hay[i..].starts_with(&needle));
    Ok(Value::Int(found.map_or(-1, |i| i as i64)))
}

fn lower_ascii(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s)] => Ok(Value::String(s.to_ascii_lowercase())),
        _ => Err(invalid("lowerAscii", args)),
    }
}

fn upper_ascii(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s)] => Ok(Value::String(s.to_ascii_uppercase())),
        _ => Err(invalid("upperAscii", args)),
    }
}

fn replace(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s), Value::String(from), Value::String(to)] => {
            Ok(Value::String(s.replace(from.as_str(), to)))
        }
        [Value::String(s), Value::String(from), Value::String(to), Value::Int(n)] => {
            let replaced = match usize::try_from(*n) {
                Ok(limit) => s.replacen(from.as_str(), to, limit),
                Err(_) => s.replace(from.as_str(), to),
            };
            Ok(Value::String(replaced))
        }
        _ => Err(invalid("replace", args)),
    }
}

fn split(args: &[Value]) -> Result<Value, EvalError> {
    let parts: Vec<Value> = match args {
        [Value::String(s), Value::String(sep)] => {
            split_all(s, sep).into_iter().map(Value::String).collect()
        }
        [Value::String(s), Value::String(sep), Value::Int(n)] => match usize::try_from(*n) {
            Ok(0) => Vec::new(),
            Ok(limit) if !sep.is_empty() => s
                .splitn(limit, sep.as_str())
                .map(|p| Value::String(p.to_string()))
                .collect(),
            Ok(limit) => {
                let mut all = split_all(s, sep);
                if all.len() > limit {
                    let rest: String = all.split_off(limit - 1).concat();
                    all.push(rest);
                }
                all.into_iter().map(Value::String).collect()
            }
            Err(_) => split_all(s, sep).into_iter().map(Value::String).collect(),
        },
        _ => return Err(invalid("split", args)),
    };
    Ok(Value::List(Arc::new(parts)))
}

/// An empty separator splits into code points.
fn split_all(s: &str, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        s.chars().map(|c| c.to_string()).collect()
    } else {
        s.split(sep).map(str::to_string).collect()
    }
}

fn substring(args: &[Value]) -> Result<Value, EvalError> {
    let (s, start, end) = match args {
        [Value::String(s), Value::Int(start)] => (s, *start, None),
        [Value::String(s), Value::Int(start), Value::Int(end)] => (s, *start, Some(*end)),
        _ => return Err(invalid("substring", args)),
    };
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let bound = |i: i64| {
        usize::try_from(i)
            .ok()
            .filter(|&i| i <= len)
            .ok_or_else(|| out_of_range(i, len))
    };
    let from = bound(start)?;
    let to = match end {
        Some(e) => bound(e)?,
        None => len,
    };
    if from > to {
        return Err(EvalError::InvalidArgument(format!(
            "invalid substring range. start: {}, end: {}",
            from, to
        )));
    }
    Ok(Value::String(chars[from..to].iter().collect()))
}

fn trim(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s)] => Ok(Value::String(s.trim().to_string())),
        _ => Err(invalid("trim", args)),
    }
}

fn join(args: &[Value]) -> Result<Value, EvalError> {
    let (items, sep) = match args {
        [Value::List(items)] => (items, ""),
        [Value::List(items), Value::String(sep)] => (items, sep.as_str()),
        _ => return Err(invalid("join", args)),
    };
    let mut parts = Vec::with_capacity(items.len());
    for item in items.iter() {
        match item {
            Value::String(s) => parts.push(s.as_str()),
            other => {
                return Err(EvalError::InvalidArgument(format!(
                    "join: list element is {}, not string",
                    other.type_name()
                )))
            }
        }
    }
    Ok(Value::String(parts.join(sep)))
}

pub struct StringsLibrary;

impl Library for StringsLibrary {
    fn name(&self) -> &str {
        "strings"
    }

    fn install(&self, env: &mut EnvBuilder) -> Result<(), EnvError> {
        use Type::{Int, String as Str};
        let member = OverloadDecl::member;

        env.function(
            "charAt",
            vec![member("string_char_at_int", vec![Str, Int], Str).with_impl(char_at)],
        )?;
        env.function(
            "indexOf",
            vec![
                member("string_index_of_string", vec![Str, Str], Int).with_impl(index_of),
                member("string_index_of_string_int", vec![Str, Str, Int], Int).with_impl(index_of),
            ],
        )?;
        env.function(
            "lastIndexOf",
            vec![
                member("string_last_index_of_string", vec![Str, Str], Int).with_impl(last_index_of),
                member("string_last_index_of_string_int", vec![Str, Str, Int], Int)
                    .with_impl(last_index_of),
            ],
        )?;
        env.function(
            "lowerAscii",
            vec![member("string_lower_ascii", vec![Str], Str).with_impl(lower_ascii)],
        )?;
        env.function(
            "upperAscii",
            vec![member("string_upper_ascii", vec![Str], Str).with_impl(upper_ascii)],
        )?;
        env.function(
            "replace",
            vec![
                member("string_replace_string_string", vec![Str, Str, Str], Str).with_impl(replace),
                member("string_replace_string_string_int", vec![Str, Str, Str, Int], Str)
                    .with_impl(replace),
            ],
        )?;
        env.function(
            "split",
            vec![
                member("string_split_string", vec![Str, Str], Type::list(Str)).with_impl(split),
                member("string_split_string_int", vec![Str, Str, Int], Type::list(Str))
                    .with_impl(split),
            ],
        )?;
        env.function(
            "substring",
            vec![
                member("string_substring_int", vec![Str, Int], Str).with_impl(substring),
                member("string_substring_int_int", vec![Str, Int, Int], Str).with_impl(substring),
            ],
        )?;
        env.function(
            "trim",
            vec![member("string_trim", vec![Str], Str).with_impl(trim)],
        )?;
        env.function(
            "join",
            vec![
                member("list_join", vec![Type::list(Str)], Str).with_impl(join),
                member("list_join_string", vec![Type::list(Str), Str], Str).with_impl(join),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::activation::Activation;
    use crate::cel::env::Env;

    fn eval(source: &str) -> Result<Value, EvalError> {
        let mut b = Env::builder();
        b.variable("body", Type::Dyn).unwrap();
        b.library(&StringsLibrary).unwrap();
        let env = b.build();
        let checked = env.check(&env.parse(source).unwrap()).unwrap();
        let body = Value::from_json(serde_json::json!({"words": ["a", "b", "c"], "mixed": ["a", 1]}));
        env.program(&checked)
            .unwrap()
            .eval(&Activation::new().with_var("body", body))
    }

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn test_char_at() {
        assert_eq!(eval("'héllo'.charAt(1)").unwrap(), s("é"));
        assert_eq!(eval("'abc'.charAt(3)").unwrap(), s(""));
        assert!(matches!(eval("'abc'.charAt(4)"), Err(EvalError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_index_of() {
        assert_eq!(eval("'hello mellow'.indexOf('ello')").unwrap(), Value::Int(1));
        assert_eq!(eval("'hello mellow'.indexOf('ello', 2)").unwrap(), Value::Int(7));
        assert_eq!(eval("'hello'.indexOf('z')").unwrap(), Value::Int(-1));
        assert_eq!(eval("'hello'.indexOf('')").unwrap(), Value::Int(0));
        assert_eq!(eval("'hello mellow'.lastIndexOf('ello')").unwrap(), Value::Int(7));
        assert_eq!(eval("'hello mellow'.lastIndexOf('ello', 6)").unwrap(), Value::Int(1));
        assert!(eval("'abc'.indexOf('a', 9)").is_err());
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(eval("'TacoCat'.lowerAscii()").unwrap(), s("tacocat"));
        assert_eq!(eval("'TacoCat'.upperAscii()").unwrap(), s("TACOCAT"));
        assert_eq!(eval("'  pad \\n'.trim()").unwrap(), s("pad"));
    }

    #[test]
    fn test_replace() {
        assert_eq!(eval("'a-b-c'.replace('-', '+')").unwrap(), s("a+b+c"));
        assert_eq!(eval("'a-b-c'.replace('-', '+', 1)").unwrap(), s("a+b-c"));
        assert_eq!(eval("'a-b-c'.replace('-', '+', -1)").unwrap(), s("a+b+c"));
    }

    #[test]
    fn test_split() {
        assert_eq!(
            eval("'a,b,c'.split(',')").unwrap(),
            Value::from(vec![s("a"), s("b"), s("c")])
        );
        assert_eq!(
            eval("'a,b,c'.split(',', 2)").unwrap(),
            Value::from(vec![s("a"), s("b,c")])
        );
        assert_eq!(eval("'a,b'.split(',', 0)").unwrap(), Value::from(Vec::<Value>::new()));
        assert_eq!(eval("'ab'.split('')").unwrap(), Value::from(vec![s("a"), s("b")]));
    }

    #[test]
    fn test_substring() {
        assert_eq!(eval("'tacocat'.substring(4)").unwrap(), s("cat"));
        assert_eq!(eval("'tacocat'.substring(0, 4)").unwrap(), s("taco"));
        assert!(eval("'abc'.substring(2, 1)").is_err());
        assert!(eval("'abc'.substring(5)").is_err());
    }

    #[test]
    fn test_join() {
        assert_eq!(eval("['x', 'y'].join()").unwrap(), s("xy"));
        assert_eq!(eval("body.words.join('/')").unwrap(), s("a/b/c"));
        assert!(eval("body.mixed.join()").is_err());
    }
}
