use std::collections::HashMap;
use std::sync::Arc;

use super::activation::Activation;
use super::ast::{BinaryOp, MacroKind, UnaryOp};
use super::errors::EvalError;
use super::operations::*;
use super::program::{Candidate, Node};
use super::value::Value;

/// Tree-walking evaluator over a compiled [`Node`] tree.
pub struct Interpreter<'a> {
    activation: &'a Activation,
    constants: &'a HashMap<String, Value>,
    locals: Vec<(String, Value)>,
}

impl<'a> Interpreter<'a> {
    pub fn new(activation: &'a Activation, constants: &'a HashMap<String, Value>) -> Self {
        Self {
            activation,
            constants,
            locals: Vec::new(),
        }
    }

    fn resolve(&self, name: &str) -> Result<Value, EvalError> {
        if let Some((_, v)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(v.clone());
        }
        self.activation
            .get(name)
            .or_else(|| self.constants.get(name))
            .cloned()
            .ok_or_else(|| EvalError::UnboundVariable(name.to_string()))
    }

    pub fn eval(&mut self, node: &Node) -> Result<Value, EvalError> {
        match node {
            Node::Literal(v) => Ok(v.clone()),
            Node::Ident(name) => self.resolve(name),

            Node::Select {
                operand,
                field,
                test_only,
            } => {
                let v = self.eval(operand)?;
                select(&v, field, *test_only)
            }

            Node::Index { operand, index: idx } => {
                let v = self.eval(operand)?;
                let i = self.eval(idx)?;
                index(&v, &i)
            }

            Node::Call {
                function,
                args,
                candidates,
            } => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                dispatch(function, candidates, &values)
            }

            Node::List(elements) => {
                let items = elements
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(Arc::new(items)))
            }

            Node::Map(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    pairs.push((self.eval(k)?, self.eval(v)?));
                }
                build_map(pairs)
            }

            Node::Unary { op, operand } => {
                let v = self.eval(operand)?;
                match op {
                    UnaryOp::Not => match v {
                        Value::Bool(b) => Ok(Value::Bool(!b)),
                        other => Err(EvalError::no_overload("!_", &[other.type_name()])),
                    },
                    UnaryOp::Neg => negate(&v),
                }
            }

            Node::Binary { op, left, right } => match op {
                BinaryOp::And => self.logical(left, right, false),
                BinaryOp::Or => self.logical(left, right, true),
                BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::In => {
                    let l = self.eval(left)?;
                    let r = self.eval(right)?;
                    relation(*op, &l, &r)
                }
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                    let l = self.eval(left)?;
                    let r = self.eval(right)?;
                    arithmetic(*op, &l, &r)
                }
            },

            Node::Conditional {
                cond,
                then_branch,
                else_branch,
            } => match self.eval(cond)? {
                Value::Bool(true) => self.eval(then_branch),
                Value::Bool(false) => self.eval(else_branch),
                other => Err(EvalError::no_overload("_?_:_", &[other.type_name()])),
            },

            Node::Comprehension {
                kind,
                range,
                var,
                predicate,
                transform,
            } => {
                let range = self.eval(range)?;
                let items: Vec<Value> = match &range {
                    Value::List(items) => items.as_ref().clone(),
                    Value::Map(entries) => entries.keys().map(|k| k.to_value()).collect(),
                    other => {
                        return Err(EvalError::no_overload(kind.name(), &[other.type_name()]))
                    }
                };
                self.comprehension(*kind, items, var, predicate.as_deref(), transform.as_deref())
            }
        }
    }

    /// `&&` and `||`: a decisive operand wins over an error on the other side.
    fn logical(&mut self, left: &Node, right: &Node, decisive: bool) -> Result<Value, EvalError> {
        let name = if decisive { "_||_" } else { "_&&_" };
        let l = self.eval(left);
        if let Ok(Value::Bool(b)) = l {
            if b == decisive {
                return Ok(Value::Bool(b));
            }
        }
        let r = self.eval(right);
        match (l, r) {
            (_, Ok(Value::Bool(b))) if b == decisive => Ok(Value::Bool(b)),
            (Ok(Value::Bool(_)), Ok(Value::Bool(b))) => Ok(Value::Bool(b)),
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(a), Ok(b)) => Err(EvalError::no_overload(name, &[a.type_name(), b.type_name()])),
        }
    }

    fn with_local<T>(
        &mut self,
        var: &str,
        value: Value,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        self.locals.push((var.to_string(), value));
        let result = f(self);
        self.locals.pop();
        result
    }

    fn test(&mut self, kind: MacroKind, var: &str, item: Value, predicate: &Node) -> Result<bool, EvalError> {
        match self.with_local(var, item, |me| me.eval(predicate))? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::no_overload(kind.name(), &[other.type_name()])),
        }
    }

    fn comprehension(
        &mut self,
        kind: MacroKind,
        items: Vec<Value>,
        var: &str,
        predicate: Option<&Node>,
        transform: Option<&Node>,
    ) -> Result<Value, EvalError> {
        match kind {
            MacroKind::All | MacroKind::Exists => {
                let decisive = kind == MacroKind::Exists;
                let mut deferred = None;
                if let Some(p) = predicate {
                    for item in items {
                        match self.test(kind, var, item, p) {
                            Ok(b) if b == decisive => return Ok(Value::Bool(decisive)),
                            Ok(_) => {}
                            Err(e) => deferred = deferred.or(Some(e)),
                        }
                    }
                }
                match deferred {
                    Some(e) => Err(e),
                    None => Ok(Value::Bool(!decisive)),
                }
            }
            MacroKind::ExistsOne => {
                let mut count = 0usize;
                if let Some(p) = predicate {
                    for item in items {
                        if self.test(kind, var, item, p)? {
                            count += 1;
                        }
                    }
                }
                Ok(Value::Bool(count == 1))
            }
            MacroKind::Filter => {
                let mut kept = Vec::new();
                if let Some(p) = predicate {
                    for item in items {
                        if self.test(kind, var, item.clone(), p)? {
                            kept.push(item);
                        }
                    }
                }
                Ok(Value::List(Arc::new(kept)))
            }
            MacroKind::Map => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(p) = predicate {
                        if !self.test(kind, var, item.clone(), p)? {
                            continue;
                        }
                    }
                    match transform {
                        Some(t) => out.push(self.with_local(var, item, |me| me.eval(t))?),
                        None => out.push(item),
                    }
                }
                Ok(Value::List(Arc::new(out)))
            }
        }
    }
}

/// Call the first candidate whose parameter types accept the arguments.
fn dispatch(function: &str, candidates: &[Candidate], args: &[Value]) -> Result<Value, EvalError> {
    match candidates.iter().find(|c| c.accepts(args)) {
        Some(c) => (c.handler)(args),
        None => {
            let types: Vec<&str> = args.iter().map(|a| a.type_name()).collect();
            Err(EvalError::no_overload(function, &types))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::env::Env;
    use crate::cel::types::Type;

    fn eval_with(source: &str, activation: &Activation) -> Result<Value, EvalError> {
        let mut b = Env::builder();
        b.variable("body", Type::Dyn).unwrap();
        b.variable("n", Type::Int).unwrap();
        let env = b.build();
        let checked = env.check(&env.parse(source).unwrap()).unwrap();
        env.program(&checked).unwrap().eval(activation)
    }

    fn eval(source: &str) -> Result<Value, EvalError> {
        let body = Value::from_json(serde_json::json!({"x": 1, "items": [1, 2, 3], "name": "bob"}));
        eval_with(source, &Activation::new().with_var("body", body).with_var("n", 10i64))
    }

    #[test]
    fn test_field_access_and_arithmetic() {
        assert_eq!(eval("body.x + 1").unwrap(), Value::Int(2));
        assert_eq!(eval("body.items[2] * n").unwrap(), Value::Int(30));
        assert_eq!(eval("body.name + '!'").unwrap(), Value::from("bob!"));
    }

    #[test]
    fn test_missing_key_errors() {
        assert!(matches!(eval("body.missing"), Err(EvalError::NoSuchKey(_))));
        assert_eq!(eval("has(body.missing)").unwrap(), Value::Bool(false));
        assert_eq!(eval("has(body.x)").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logical_operators_absorb_errors() {
        assert_eq!(eval("false && body.missing == 1").unwrap(), Value::Bool(false));
        assert_eq!(eval("body.missing == 1 && false").unwrap(), Value::Bool(false));
        assert_eq!(eval("body.missing == 1 || true").unwrap(), Value::Bool(true));
        assert!(eval("body.missing == 1 || false").is_err());
    }

    #[test]
    fn test_conditional() {
        assert_eq!(eval("n > 5 ? 'big' : 'small'").unwrap(), Value::from("big"));
        assert!(eval("body.x ? 1 : 2").is_err());
    }

    #[test]
    fn test_comprehensions() {
        assert_eq!(eval("body.items.all(i, i > 0)").unwrap(), Value::Bool(true));
        assert_eq!(eval("body.items.exists(i, i == 2)").unwrap(), Value::Bool(true));
        assert_eq!(eval("body.items.exists_one(i, i > 1)").unwrap(), Value::Bool(false));
        assert_eq!(
            eval("body.items.map(i, i * 2)").unwrap(),
            Value::from(vec![Value::Int(2), Value::Int(4), Value::Int(6)])
        );
        assert_eq!(
            eval("body.items.map(i, i > 1, i * 10)").unwrap(),
            Value::from(vec![Value::Int(20), Value::Int(30)])
        );
        assert_eq!(
            eval("body.items.filter(i, i % 2 == 1)").unwrap(),
            Value::from(vec![Value::Int(1), Value::Int(3)])
        );
        assert_eq!(eval("body.exists(k, k == 'name')").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_comprehension_variable_shadows() {
        assert_eq!(eval("[1, 2].exists(n, n == 2)").unwrap(), Value::Bool(true));
        assert_eq!(eval("[1, 2].map(n, n)[1] + n").unwrap(), Value::Int(12));
    }

    #[test]
    fn test_unbound_variable() {
        let err = eval_with("n + 1", &Activation::new()).unwrap_err();
        assert_eq!(err, EvalError::UnboundVariable("n".into()));
    }

    #[test]
    fn test_map_literal_and_in() {
        assert_eq!(eval("'a' in {'a': 1}").unwrap(), Value::Bool(true));
        assert_eq!(eval("4 in body.items").unwrap(), Value::Bool(false));
        assert!(matches!(eval("{'a': 1, 'a': 2}"), Err(EvalError::InvalidArgument(_))));
    }
}
