//! Compiled programs: checked expressions with every call bound to its
//! implementations, ready to run against an [`Activation`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::activation::Activation;
use super::ast::*;
use super::checker::CheckedAst;
use super::decls::Handler;
use super::env::Env;
use super::errors::{CompileError, EvalError};
use super::interpreter::Interpreter;
use super::types::Type;
use super::value::Value;

/// One bound overload a call may dispatch to at runtime
#[derive(Clone)]
pub struct Candidate {
    pub id: String,
    pub params: Vec<Type>,
    pub handler: Handler,
}

impl Candidate {
    pub fn accepts(&self, args: &[Value]) -> bool {
        self.params.len() == args.len()
            && self.params.iter().zip(args).all(|(p, a)| p.matches_value(a))
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Candidate({})", self.id)
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Literal(Value),
    Ident(String),
    Select {
        operand: Box<Node>,
        field: String,
        test_only: bool,
    },
    Index {
        operand: Box<Node>,
        index: Box<Node>,
    },
    /// Receiver-style calls carry the receiver as `args[0]`.
    Call {
        function: String,
        args: Vec<Node>,
        candidates: Vec<Candidate>,
    },
    List(Vec<Node>),
    Map(Vec<(Node, Node)>),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Conditional {
        cond: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Box<Node>,
    },
    Comprehension {
        kind: MacroKind,
        range: Box<Node>,
        var: String,
        predicate: Option<Box<Node>>,
        transform: Option<Box<Node>>,
    },
}

#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    root: Node,
    constants: Arc<HashMap<String, Value>>,
}

impl Program {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, activation: &Activation) -> Result<Value, EvalError> {
        Interpreter::new(activation, &self.constants).eval(&self.root)
    }
}

pub fn compile(env: &Env, checked: &CheckedAst) -> Result<Program, CompileError> {
    Ok(Program {
        source: checked.source.clone(),
        root: compile_expr(env, &checked.expr)?,
        constants: env.constants().clone(),
    })
}

fn boxed(env: &Env, expr: &Expr) -> Result<Box<Node>, CompileError> {
    compile_expr(env, expr).map(Box::new)
}

fn compile_expr(env: &Env, expr: &Expr) -> Result<Node, CompileError> {
    Ok(match expr {
        Expr::Literal { value } => Node::Literal(value.clone()),
        Expr::Ident { name } => Node::Ident(name.clone()),
        Expr::Select {
            operand,
            field,
            test_only,
        } => Node::Select {
            operand: boxed(env, operand)?,
            field: field.clone(),
            test_only: *test_only,
        },
        Expr::Index { operand, index } => Node::Index {
            operand: boxed(env, operand)?,
            index: boxed(env, index)?,
        },
        Expr::Call {
            target,
            function,
            args,
            overloads,
        } => {
            let unresolved = || CompileError::UnresolvedCall {
                function: function.clone(),
            };
            if overloads.is_empty() {
                return Err(unresolved());
            }
            let decl = env.function(function).ok_or_else(unresolved)?;
            let mut candidates = Vec::with_capacity(overloads.len());
            for id in overloads {
                let overload = decl.overload(id).ok_or_else(unresolved)?;
                let handler = overload
                    .handler
                    .clone()
                    .ok_or_else(|| CompileError::UnboundOverload {
                        function: function.clone(),
                        overload: id.clone(),
                    })?;
                candidates.push(Candidate {
                    id: id.clone(),
                    params: overload.params.clone(),
                    handler,
                });
            }
            let mut nodes = Vec::with_capacity(args.len() + 1);
            if let Some(t) = target {
                nodes.push(compile_expr(env, t)?);
            }
            for arg in args {
                nodes.push(compile_expr(env, arg)?);
            }
            Node::Call {
                function: function.clone(),
                args: nodes,
                candidates,
            }
        }
        Expr::List { elements } => Node::List(
            elements
                .iter()
                .map(|e| compile_expr(env, e))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Map { entries } => Node::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((compile_expr(env, k)?, compile_expr(env, v)?)))
                .collect::<Result<_, CompileError>>()?,
        ),
        Expr::Unary { op, operand } => Node::Unary {
            op: *op,
            operand: boxed(env, operand)?,
        },
        Expr::Binary { op, left, right } => Node::Binary {
            op: *op,
            left: boxed(env, left)?,
            right: boxed(env, right)?,
        },
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => Node::Conditional {
            cond: boxed(env, cond)?,
            then_branch: boxed(env, then_branch)?,
            else_branch: boxed(env, else_branch)?,
        },
        Expr::Comprehension {
            kind,
            range,
            var,
            predicate,
            transform,
        } => Node::Comprehension {
            kind: *kind,
            range: boxed(env, range)?,
            var: var.clone(),
            predicate: predicate.as_deref().map(|p| boxed(env, p)).transpose()?,
            transform: transform.as_deref().map(|t| boxed(env, t)).transpose()?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::parser::parse;

    #[test]
    fn test_compile_requires_checked_calls() {
        let env = Env::default();
        let ast = parse("f(1)").unwrap();
        let unchecked = CheckedAst {
            source: ast.source.clone(),
            expr: ast.expr,
            result_type: Type::Dyn,
        };
        assert_eq!(
            compile(&env, &unchecked).unwrap_err(),
            CompileError::UnresolvedCall { function: "f".into() }
        );
    }

    #[test]
    fn test_program_keeps_source() {
        let env = Env::default();
        let checked = env.check(&env.parse("1 + 1").unwrap()).unwrap();
        let program = env.program(&checked).unwrap();
        assert_eq!(program.source(), "1 + 1");
        assert_eq!(program.eval(&Activation::new()).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_candidate_accepts() {
        let c = Candidate {
            id: "size_string".into(),
            params: vec![Type::String],
            handler: Arc::new(|_| Ok(Value::Null)),
        };
        assert!(c.accepts(&[Value::from("x")]));
        assert!(!c.accepts(&[Value::Int(1)]));
        assert!(!c.accepts(&[]));
        assert_eq!(format!("{:?}", c), "Candidate(size_string)");
    }
}
