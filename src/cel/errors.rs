//! Errors raised by each stage of the expression engine.

use thiserror::Error;

/// Syntax error from the lexer or parser
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at position {pos}")]
pub struct ParseError {
    pub message: String,
    pub pos: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, pos: usize) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

/// All issues found while type-checking one expression
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", .issues.join("; "))]
pub struct CheckError {
    pub issues: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("no implementation bound for overload '{overload}' of function '{function}'")]
    UnboundOverload { function: String, overload: String },

    #[error("function '{function}' has no checked overloads")]
    UnresolvedCall { function: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("modulus by zero")]
    ModulusByZero,

    #[error("{0} overflow")]
    Overflow(String),

    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("index out of range: {index} (size {size})")]
    IndexOutOfRange { index: i64, size: usize },

    #[error("no such overload: {function}({args})")]
    NoMatchingOverload { function: String, args: String },

    #[error("no value bound for variable '{0}'")]
    UnboundVariable(String),

    #[error("{0}")]
    InvalidArgument(String),
}

impl EvalError {
    pub fn no_overload(function: &str, args: &[&str]) -> Self {
        EvalError::NoMatchingOverload {
            function: function.to_string(),
            args: args.join(", "),
        }
    }
}

/// Raised while assembling an [`Env`](super::env::Env)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("variable '{0}' is already declared")]
    DuplicateVariable(String),

    #[error("overload '{0}' is already declared")]
    DuplicateOverload(String),

    #[error("overload '{overload}' of function '{function}' is declared as a member but has no receiver parameter")]
    MissingReceiver { function: String, overload: String },

    #[error("cannot bind unknown overload '{0}'")]
    UnknownOverload(String),

    #[error("library '{library}' failed: {message}")]
    Library { library: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let e = ParseError::new("Unexpected token", 4);
        assert_eq!(e.to_string(), "Unexpected token at position 4");
    }

    #[test]
    fn test_check_error_joins_issues() {
        let e = CheckError {
            issues: vec!["undeclared reference to 'x'".into(), "bad".into()],
        };
        assert_eq!(e.to_string(), "undeclared reference to 'x'; bad");
    }

    #[test]
    fn test_eval_error_display() {
        assert!(EvalError::DivisionByZero.to_string().contains("division"));
        let e = EvalError::no_overload("_+_", &["int", "string"]);
        assert_eq!(e.to_string(), "no such overload: _+_(int, string)");
        let e = EvalError::IndexOutOfRange { index: 3, size: 2 };
        assert!(e.to_string().contains("3"));
    }

    #[test]
    fn test_env_error_display() {
        let e = EnvError::DuplicateVariable("body".into());
        assert!(e.to_string().contains("body"));
    }
}
