//! Variable and function declarations shared by the checker and compiler.

use std::fmt;
use std::sync::Arc;

use super::errors::EvalError;
use super::types::Type;
use super::value::Value;

/// Implementation of one overload. Receiver-style overloads get the
/// receiver as the first argument.
pub type Handler = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone)]
pub struct OverloadDecl {
    pub id: String,
    pub member: bool,
    pub params: Vec<Type>,
    pub result: Type,
    pub handler: Option<Handler>,
}

impl OverloadDecl {
    pub fn global(id: &str, params: Vec<Type>, result: Type) -> Self {
        Self {
            id: id.to_string(),
            member: false,
            params,
            result,
            handler: None,
        }
    }

    /// `params[0]` is the receiver type.
    pub fn member(id: &str, params: Vec<Type>, result: Type) -> Self {
        Self {
            member: true,
            ..Self::global(id, params, result)
        }
    }

    pub fn with_impl<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(f));
        self
    }

    pub fn signature(&self, function: &str) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        if self.member && !params.is_empty() {
            format!("{}.{}({}) -> {}", params[0], function, params[1..].join(", "), self.result)
        } else {
            format!("{}({}) -> {}", function, params.join(", "), self.result)
        }
    }
}

impl fmt::Debug for OverloadDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverloadDecl")
            .field("id", &self.id)
            .field("member", &self.member)
            .field("params", &self.params)
            .field("result", &self.result)
            .field("bound", &self.handler.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub overloads: Vec<OverloadDecl>,
}

impl FunctionDecl {
    pub fn overload(&self, id: &str) -> Option<&OverloadDecl> {
        self.overloads.iter().find(|o| o.id == id)
    }
}
