use indexmap::IndexMap;
use std::cmp::Ordering;
use std::sync::Arc;

use super::ast::BinaryOp;
use super::errors::EvalError;
use super::value::{map_get, numeric_cmp, Key, Value};

fn no_overload(op: BinaryOp, a: &Value, b: &Value) -> EvalError {
    EvalError::no_overload(&format!("_{}_", op.symbol()), &[a.type_name(), b.type_name()])
}

/// Ordering for `<`, `<=`, `>`, `>=`
pub fn compare(a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ if a.is_number() && b.is_number() => numeric_cmp(a, b),
        _ => return Err(no_overload(BinaryOp::Lt, a, b)),
    };
    // NaN compares as neither less nor greater
    ordering.ok_or_else(|| EvalError::InvalidArgument("NaN is not comparable".to_string()))
}

pub fn relation(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
    let result = match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        BinaryOp::Lt => compare(a, b)? == Ordering::Less,
        BinaryOp::Le => compare(a, b)? != Ordering::Greater,
        BinaryOp::Gt => compare(a, b)? == Ordering::Greater,
        BinaryOp::Ge => compare(a, b)? != Ordering::Less,
        BinaryOp::In => contains(b, a)?,
        _ => return Err(no_overload(op, a, b)),
    };
    Ok(Value::Bool(result))
}

/// `needle in haystack`
pub fn contains(haystack: &Value, needle: &Value) -> Result<bool, EvalError> {
    match haystack {
        Value::List(items) => Ok(items.iter().any(|item| item == needle)),
        Value::Map(entries) => Ok(Key::from_value(needle)
            .map_or(false, |key| map_get(entries, &key).is_some())),
        _ => Err(no_overload(BinaryOp::In, needle, haystack)),
    }
}

pub fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (op, a, b) {
        (BinaryOp::Add, Value::String(x), Value::String(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::String(s))
        }
        (BinaryOp::Add, Value::Bytes(x), Value::Bytes(y)) => {
            let mut v = x.clone();
            v.extend_from_slice(y);
            Ok(Value::Bytes(v))
        }
        (BinaryOp::Add, Value::List(x), Value::List(y)) => {
            let mut v = Vec::with_capacity(x.len() + y.len());
            v.extend(x.iter().cloned());
            v.extend(y.iter().cloned());
            Ok(Value::List(Arc::new(v)))
        }
        (_, Value::Int(x), Value::Int(y)) => int_op(op, *x, *y),
        (_, Value::UInt(x), Value::UInt(y)) => uint_op(op, *x, *y),
        _ if a.is_number() && b.is_number() => {
            // Mixed numeric kinds promote to double
            let x = a.as_f64().unwrap_or_default();
            let y = b.as_f64().unwrap_or_default();
            match op {
                BinaryOp::Add => Ok(Value::Double(x + y)),
                BinaryOp::Sub => Ok(Value::Double(x - y)),
                BinaryOp::Mul => Ok(Value::Double(x * y)),
                BinaryOp::Div => Ok(Value::Double(x / y)),
                _ => Err(no_overload(op, a, b)),
            }
        }
        _ => Err(no_overload(op, a, b)),
    }
}

fn int_op(op: BinaryOp, x: i64, y: i64) -> Result<Value, EvalError> {
    let overflow = || EvalError::Overflow("int".to_string());
    let result = match op {
        BinaryOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinaryOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinaryOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinaryOp::Div => {
            if y == 0 {
                return Err(EvalError::DivisionByZero);
            }
            x.checked_div(y).ok_or_else(overflow)?
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(EvalError::ModulusByZero);
            }
            x.checked_rem(y).ok_or_else(overflow)?
        }
        _ => return Err(no_overload(op, &Value::Int(x), &Value::Int(y))),
    };
    Ok(Value::Int(result))
}

fn uint_op(op: BinaryOp, x: u64, y: u64) -> Result<Value, EvalError> {
    let overflow = || EvalError::Overflow("uint".to_string());
    let result = match op {
        BinaryOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinaryOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinaryOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinaryOp::Div => {
            if y == 0 {
                return Err(EvalError::DivisionByZero);
            }
            x / y
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(EvalError::ModulusByZero);
            }
            x % y
        }
        _ => return Err(no_overload(op, &Value::UInt(x), &Value::UInt(y))),
    };
    Ok(Value::UInt(result))
}

pub fn negate(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Int(i) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::Overflow("int".to_string())),
        Value::Double(d) => Ok(Value::Double(-d)),
        other => Err(EvalError::no_overload("-_", &[other.type_name()])),
    }
}

/// Build a map literal, rejecting unsupported and repeated keys.
pub fn build_map(entries: Vec<(Value, Value)>) -> Result<Value, EvalError> {
    let mut map = IndexMap::with_capacity(entries.len());
    for (k, v) in entries {
        let key = Key::from_value(&k).ok_or_else(|| {
            EvalError::InvalidArgument(format!("unsupported key type: {}", k.type_name()))
        })?;
        if map.insert(key.clone(), v).is_some() {
            return Err(EvalError::InvalidArgument(format!("Failed with repeated key: {}", key)));
        }
    }
    Ok(Value::Map(Arc::new(map)))
}

/// `operand[index]`
pub fn index(operand: &Value, index: &Value) -> Result<Value, EvalError> {
    match operand {
        Value::List(items) => {
            let i = match index {
                Value::Int(i) => *i,
                Value::UInt(u) => i64::try_from(*u).unwrap_or(i64::MAX),
                Value::Double(d) if d.fract() == 0.0 => *d as i64,
                other => {
                    return Err(EvalError::no_overload("_[_]", &["list", other.type_name()]))
                }
            };
            usize::try_from(i)
                .ok()
                .and_then(|idx| items.get(idx))
                .cloned()
                .ok_or(EvalError::IndexOutOfRange {
                    index: i,
                    size: items.len(),
                })
        }
        Value::Map(entries) => {
            let key = Key::from_value(index).ok_or_else(|| {
                EvalError::no_overload("_[_]", &["map", index.type_name()])
            })?;
            map_get(entries, &key)
                .cloned()
                .ok_or_else(|| EvalError::NoSuchKey(key.to_string()))
        }
        other => Err(EvalError::no_overload("_[_]", &[other.type_name(), index.type_name()])),
    }
}

/// `operand.field`, or `has(operand.field)` when `test_only` is set.
pub fn select(operand: &Value, field: &str, test_only: bool) -> Result<Value, EvalError> {
    match operand {
        Value::Map(entries) => {
            let found = entries.get(&Key::String(field.to_string()));
            if test_only {
                return Ok(Value::Bool(found.is_some()));
            }
            found
                .cloned()
                .ok_or_else(|| EvalError::NoSuchKey(format!("{:?}", field)))
        }
        other => Err(EvalError::InvalidArgument(format!(
            "type '{}' does not support field selection ('{}')",
            other.type_name(),
            field
        ))),
    }
}
