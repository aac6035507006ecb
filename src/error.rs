use thiserror::Error;

use crate::cel::{CheckError, CompileError, EnvError, EvalError, ParseError};
use crate::patch::PatchError;

/// Every way a single interceptor run can fail. All variants are terminal
/// for the run; [`InterceptorError::FilterRejected`] means "do not proceed"
/// rather than a fault.
#[derive(Debug, Error)]
pub enum InterceptorError {
    #[error("error reading request body: {0}")]
    BodyRead(#[from] std::io::Error),

    #[error("failed to parse the body as JSON: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("error creating cel environment: {0}")]
    EnvironmentConstruction(#[from] EnvError),

    #[error("failed to parse expression {expression:?}: {source}")]
    Parse {
        expression: String,
        #[source]
        source: ParseError,
    },

    #[error("expression {expression:?} check failed: {source}")]
    TypeCheck {
        expression: String,
        #[source]
        source: CheckError,
    },

    #[error("expression {expression:?} failed to create a Program: {source}")]
    Compile {
        expression: String,
        #[source]
        source: CompileError,
    },

    #[error("expression {expression:?} failed to evaluate: {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: EvalError,
    },

    #[error("expression {expression} did not return true")]
    FilterRejected { expression: String },

    #[error("failed to convert overlay result for key '{key}' ({value_type}) to bytes: {message}")]
    Serialization {
        key: String,
        value_type: String,
        message: String,
    },

    #[error("failed to set overlay key '{key}': {source}")]
    PatchPath {
        key: String,
        #[source]
        source: PatchError,
    },
}

impl InterceptorError {
    /// True when the filter declined the request; callers usually treat this
    /// as a normal "no match" outcome.
    pub fn is_rejection(&self) -> bool {
        matches!(self, InterceptorError::FilterRejected { .. })
    }

    /// Name of the pipeline stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            InterceptorError::BodyRead(_) => "read",
            InterceptorError::MalformedBody(_) => "context",
            InterceptorError::EnvironmentConstruction(_) => "environment",
            InterceptorError::Parse { .. } => "parse",
            InterceptorError::TypeCheck { .. } => "check",
            InterceptorError::Compile { .. } => "compile",
            InterceptorError::Evaluation { .. } => "evaluate",
            InterceptorError::FilterRejected { .. } => "filter",
            InterceptorError::Serialization { .. } => "serialize",
            InterceptorError::PatchPath { .. } => "patch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_distinguished() {
        let rejected = InterceptorError::FilterRejected {
            expression: "body.x == 2".into(),
        };
        assert!(rejected.is_rejection());
        assert_eq!(rejected.stage(), "filter");
        assert_eq!(rejected.to_string(), "expression body.x == 2 did not return true");

        let fault = InterceptorError::Evaluation {
            expression: "1 / 0".into(),
            source: EvalError::DivisionByZero,
        };
        assert!(!fault.is_rejection());
        assert_eq!(fault.stage(), "evaluate");
    }

    #[test]
    fn test_messages_embed_expression() {
        let err = InterceptorError::TypeCheck {
            expression: "nope.x".into(),
            source: CheckError {
                issues: vec!["undeclared reference to 'nope'".into()],
            },
        };
        assert_eq!(
            err.to_string(),
            "expression \"nope.x\" check failed: undeclared reference to 'nope'"
        );
    }
}
