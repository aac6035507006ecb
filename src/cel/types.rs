use std::fmt;

use super::value::Value;

/// Static types known to the checker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Dyn,
    Null,
    Bool,
    Int,
    UInt,
    Double,
    String,
    Bytes,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
}

impl Type {
    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn is_dyn(&self) -> bool {
        matches!(self, Type::Dyn)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::UInt | Type::Double)
    }

    /// Whether a value of type `arg` may be passed where `self` is expected.
    /// `dyn` on either side defers the decision to runtime.
    pub fn is_assignable_from(&self, arg: &Type) -> bool {
        match (self, arg) {
            (Type::Dyn, _) | (_, Type::Dyn) => true,
            (Type::List(a), Type::List(b)) => a.is_assignable_from(b),
            (Type::Map(ka, va), Type::Map(kb, vb)) => {
                ka.is_assignable_from(kb) && va.is_assignable_from(vb)
            }
            (a, b) => a == b,
        }
    }

    /// The common type of two branches; falls back to `dyn`.
    pub fn join(&self, other: &Type) -> Type {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (Type::List(a), Type::List(b)) => Type::list(a.join(b)),
            (Type::Map(ka, va), Type::Map(kb, vb)) => Type::map(ka.join(kb), va.join(vb)),
            _ => Type::Dyn,
        }
    }

    /// Runtime check used for dispatching dynamically typed calls.
    pub fn matches_value(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Dyn, _) => true,
            (Type::Null, Value::Null) => true,
            (Type::Bool, Value::Bool(_)) => true,
            (Type::Int, Value::Int(_)) => true,
            (Type::UInt, Value::UInt(_)) => true,
            (Type::Double, Value::Double(_)) => true,
            (Type::String, Value::String(_)) => true,
            (Type::Bytes, Value::Bytes(_)) => true,
            (Type::List(elem), Value::List(items)) => {
                elem.is_dyn() || items.iter().all(|item| elem.matches_value(item))
            }
            (Type::Map(key, val), Value::Map(entries)) => {
                (key.is_dyn() && val.is_dyn())
                    || entries.iter().all(|(k, v)| {
                        key.matches_value(&k.to_value()) && val.matches_value(v)
                    })
            }
            _ => false,
        }
    }

    pub fn of_value(value: &Value) -> Type {
        match value {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::UInt(_) => Type::UInt,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Bytes(_) => Type::Bytes,
            Value::List(_) => Type::list(Type::Dyn),
            Value::Map(_) => Type::map(Type::Dyn, Type::Dyn),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dyn => write!(f, "dyn"),
            Type::Null => write!(f, "null_type"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::UInt => write!(f, "uint"),
            Type::Double => write!(f, "double"),
            Type::String => write!(f, "string"),
            Type::Bytes => write!(f, "bytes"),
            Type::List(elem) => write!(f, "list({})", elem),
            Type::Map(k, v) => write!(f, "map({}, {})", k, v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignability() {
        assert!(Type::Dyn.is_assignable_from(&Type::Int));
        assert!(Type::Int.is_assignable_from(&Type::Dyn));
        assert!(!Type::Int.is_assignable_from(&Type::String));
        assert!(Type::list(Type::Dyn).is_assignable_from(&Type::list(Type::String)));
        assert!(!Type::list(Type::Int).is_assignable_from(&Type::list(Type::String)));
        assert!(Type::map(Type::String, Type::Dyn)
            .is_assignable_from(&Type::map(Type::String, Type::Int)));
    }

    #[test]
    fn test_join() {
        assert_eq!(Type::Int.join(&Type::Int), Type::Int);
        assert_eq!(Type::Int.join(&Type::String), Type::Dyn);
        assert_eq!(
            Type::list(Type::Int).join(&Type::list(Type::Double)),
            Type::list(Type::Dyn)
        );
    }

    #[test]
    fn test_matches_value() {
        assert!(Type::String.matches_value(&Value::from("x")));
        assert!(!Type::String.matches_value(&Value::Int(1)));
        let strings = Value::from(vec![Value::from("a"), Value::from("b")]);
        assert!(Type::list(Type::String).matches_value(&strings));
        let mixed = Value::from(vec![Value::from("a"), Value::Int(1)]);
        assert!(!Type::list(Type::String).matches_value(&mixed));
        assert!(Type::list(Type::Dyn).matches_value(&mixed));
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::map(Type::String, Type::Dyn).to_string(), "map(string, dyn)");
        assert_eq!(Type::list(Type::Int).to_string(), "list(int)");
    }
}
