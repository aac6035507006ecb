use crate::cel::{Activation, Env, Value};
use crate::error::InterceptorError;

/// Parse, check, compile and run `expression`. The first failing stage
/// aborts with the expression text attached.
pub fn evaluate(expression: &str, env: &Env, context: &Activation) -> Result<Value, InterceptorError> {
    let ast = env.parse(expression).map_err(|source| InterceptorError::Parse {
        expression: expression.to_string(),
        source,
    })?;
    let checked = env.check(&ast).map_err(|source| InterceptorError::TypeCheck {
        expression: expression.to_string(),
        source,
    })?;
    let program = env.program(&checked).map_err(|source| InterceptorError::Compile {
        expression: expression.to_string(),
        source,
    })?;
    program
        .eval(context)
        .map_err(|source| InterceptorError::Evaluation {
            expression: expression.to_string(),
            source,
        })
}
