//! Static type checker.
//!
//! Resolves every identifier against the environment, picks the candidate
//! overloads for each call and computes the result type of the expression.
//! `dyn` operands are accepted everywhere and re-checked at runtime.

use super::ast::*;
use super::env::Env;
use super::errors::CheckError;
use super::types::Type;

/// An expression whose calls have been annotated with overload ids
#[derive(Debug, Clone)]
pub struct CheckedAst {
    pub source: String,
    pub expr: Expr,
    pub result_type: Type,
}

pub fn check(env: &Env, ast: &Ast) -> Result<CheckedAst, CheckError> {
    let mut checker = Checker {
        env,
        scopes: Vec::new(),
        issues: Vec::new(),
    };
    let mut expr = ast.expr.clone();
    let result_type = checker.check_expr(&mut expr);
    if !checker.issues.is_empty() {
        return Err(CheckError {
            issues: checker.issues,
        });
    }
    Ok(CheckedAst {
        source: ast.source.clone(),
        expr,
        result_type,
    })
}

struct Checker<'a> {
    env: &'a Env,
    scopes: Vec<(String, Type)>,
    issues: Vec<String>,
}

impl<'a> Checker<'a> {
    fn issue(&mut self, message: String) -> Type {
        self.issues.push(message);
        Type::Dyn
    }

    fn lookup(&self, name: &str) -> Option<Type> {
        self.scopes
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.clone())
            .or_else(|| self.env.variable_type(name).cloned())
    }

    fn check_expr(&mut self, expr: &mut Expr) -> Type {
        match expr {
            Expr::Literal { value } => Type::of_value(value),

            Expr::Ident { name } => match self.lookup(name) {
                Some(t) => t,
                None => self.issue(format!("undeclared reference to '{}'", name)),
            },

            Expr::Select {
                operand,
                field,
                test_only,
            } => {
                let operand_type = self.check_expr(operand);
                let field_type = match &operand_type {
                    Type::Dyn => Type::Dyn,
                    Type::Map(k, v) if k.is_assignable_from(&Type::String) => (**v).clone(),
                    other => {
                        return self.issue(format!(
                            "type '{}' does not support field selection ('{}')",
                            other, field
                        ))
                    }
                };
                if *test_only {
                    Type::Bool
                } else {
                    field_type
                }
            }

            Expr::Index { operand, index } => {
                let operand_type = self.check_expr(operand);
                let index_type = self.check_expr(index);
                match &operand_type {
                    Type::Dyn => Type::Dyn,
                    Type::List(elem) => {
                        if matches!(index_type, Type::Int | Type::UInt | Type::Dyn) {
                            (**elem).clone()
                        } else {
                            self.issue(format!("list cannot be indexed by '{}'", index_type))
                        }
                    }
                    Type::Map(k, v) => {
                        if k.is_assignable_from(&index_type) {
                            (**v).clone()
                        } else {
                            self.issue(format!("{} cannot be indexed by '{}'", operand_type, index_type))
                        }
                    }
                    other => self.issue(format!("type '{}' does not support indexing", other)),
                }
            }

            Expr::Call {
                target,
                function,
                args,
                overloads,
            } => {
                let mut arg_types = Vec::with_capacity(args.len() + 1);
                if let Some(t) = target.as_deref_mut() {
                    arg_types.push(self.check_expr(t));
                }
                for arg in args.iter_mut() {
                    arg_types.push(self.check_expr(arg));
                }
                let env = self.env;
                let decl = match env.function(function) {
                    Some(decl) => decl,
                    None => return self.issue(format!("undeclared reference to '{}'", function)),
                };
                let is_member = target.is_some();
                let matching: Vec<_> = decl
                    .overloads
                    .iter()
                    .filter(|o| {
                        o.member == is_member
                            && o.params.len() == arg_types.len()
                            && o.params
                                .iter()
                                .zip(&arg_types)
                                .all(|(p, a)| p.is_assignable_from(a))
                    })
                    .collect();
                if matching.is_empty() {
                    let shown: Vec<String> = arg_types.iter().map(|t| t.to_string()).collect();
                    let call = if is_member && !shown.is_empty() {
                        format!("{}.({})", shown[0], shown[1..].join(", "))
                    } else {
                        format!("({})", shown.join(", "))
                    };
                    return self.issue(format!(
                        "found no matching overload for '{}' applied to '{}'",
                        function, call
                    ));
                }
                *overloads = matching.iter().map(|o| o.id.clone()).collect();
                let mut result = matching[0].result.clone();
                for o in &matching[1..] {
                    result = result.join(&o.result);
                }
                result
            }

            Expr::List { elements } => {
                let mut elem_type: Option<Type> = None;
                for element in elements.iter_mut() {
                    let t = self.check_expr(element);
                    elem_type = Some(match elem_type {
                        Some(prev) => prev.join(&t),
                        None => t,
                    });
                }
                Type::list(elem_type.unwrap_or(Type::Dyn))
            }

            Expr::Map { entries } => {
                let mut key_type: Option<Type> = None;
                let mut value_type: Option<Type> = None;
                for (key, value) in entries.iter_mut() {
                    let kt = self.check_expr(key);
                    if !matches!(kt, Type::String | Type::Int | Type::UInt | Type::Bool | Type::Dyn) {
                        self.issue(format!("unsupported map key type '{}'", kt));
                    }
                    let vt = self.check_expr(value);
                    key_type = Some(key_type.map_or(kt.clone(), |prev| prev.join(&kt)));
                    value_type = Some(value_type.map_or(vt.clone(), |prev| prev.join(&vt)));
                }
                Type::map(key_type.unwrap_or(Type::Dyn), value_type.unwrap_or(Type::Dyn))
            }

            Expr::Unary { op, operand } => {
                let t = self.check_expr(operand);
                match (*op, &t) {
                    (UnaryOp::Not, Type::Bool | Type::Dyn) => Type::Bool,
                    (UnaryOp::Neg, Type::Int | Type::Double | Type::Dyn) => t.clone(),
                    _ => self.issue(format!(
                        "found no matching overload for '{}' applied to '({})'",
                        op.symbol(),
                        t
                    )),
                }
            }

            Expr::Binary { op, left, right } => {
                let l = self.check_expr(left);
                let r = self.check_expr(right);
                match binary_result(*op, &l, &r) {
                    Some(t) => t,
                    None => self.issue(format!(
                        "found no matching overload for '{}' applied to '({}, {})'",
                        op.symbol(),
                        l,
                        r
                    )),
                }
            }

            Expr::Conditional {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.check_expr(cond);
                if !matches!(c, Type::Bool | Type::Dyn) {
                    self.issue(format!("conditional expects a bool condition, got '{}'", c));
                }
                let t = self.check_expr(then_branch);
                let e = self.check_expr(else_branch);
                t.join(&e)
            }

            Expr::Comprehension {
                kind,
                range,
                var,
                predicate,
                transform,
            } => {
                let range_type = self.check_expr(range);
                let var_type = match &range_type {
                    Type::Dyn => Type::Dyn,
                    Type::List(elem) => (**elem).clone(),
                    Type::Map(k, _) => (**k).clone(),
                    other => {
                        return self.issue(format!(
                            "{}() cannot iterate over '{}'",
                            kind.name(),
                            other
                        ))
                    }
                };
                self.scopes.push((var.clone(), var_type.clone()));
                if let Some(p) = predicate {
                    let pt = self.check_expr(p);
                    if !matches!(pt, Type::Bool | Type::Dyn) {
                        self.issue(format!("{}() predicate must be bool, got '{}'", kind.name(), pt));
                    }
                }
                let transform_type = transform.as_mut().map(|t| self.check_expr(t));
                self.scopes.pop();
                match kind {
                    MacroKind::All | MacroKind::Exists | MacroKind::ExistsOne => Type::Bool,
                    MacroKind::Map => Type::list(transform_type.unwrap_or(Type::Dyn)),
                    MacroKind::Filter => Type::list(var_type),
                }
            }
        }
    }
}

/// Result type of a binary operator, or `None` when no overload applies.
fn binary_result(op: BinaryOp, l: &Type, r: &Type) -> Option<Type> {
    let either_dyn = l.is_dyn() || r.is_dyn();
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let ok = |t: &Type| matches!(t, Type::Bool | Type::Dyn);
            (ok(l) && ok(r)).then_some(Type::Bool)
        }
        BinaryOp::Eq | BinaryOp::Ne => Some(Type::Bool),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let comparable = either_dyn
                || (l.is_numeric() && r.is_numeric())
                || (l == r && matches!(l, Type::String | Type::Bytes | Type::Bool));
            comparable.then_some(Type::Bool)
        }
        BinaryOp::In => match r {
            Type::Dyn => Some(Type::Bool),
            Type::List(elem) => elem.is_assignable_from(l).then_some(Type::Bool),
            Type::Map(k, _) => k.is_assignable_from(l).then_some(Type::Bool),
            _ => None,
        },
        BinaryOp::Add => match (l, r) {
            _ if either_dyn => Some(Type::Dyn),
            (Type::String, Type::String) => Some(Type::String),
            (Type::Bytes, Type::Bytes) => Some(Type::Bytes),
            (Type::List(a), Type::List(b)) => Some(Type::list(a.join(b))),
            _ => numeric_result(l, r),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            if either_dyn {
                Some(Type::Dyn)
            } else {
                numeric_result(l, r)
            }
        }
        BinaryOp::Mod => match (l, r) {
            _ if either_dyn => Some(Type::Dyn),
            (Type::Int, Type::Int) => Some(Type::Int),
            (Type::UInt, Type::UInt) => Some(Type::UInt),
            _ => None,
        },
    }
}

/// Same-kind arithmetic keeps its kind; mixed numeric kinds promote to double.
fn numeric_result(l: &Type, r: &Type) -> Option<Type> {
    if !(l.is_numeric() && r.is_numeric()) {
        return None;
    }
    if l == r {
        Some(l.clone())
    } else {
        Some(Type::Double)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::decls::OverloadDecl;
    use crate::cel::env::EnvBuilder;

    fn env() -> Env {
        let mut b = EnvBuilder::new();
        b.variable("body", Type::Dyn).unwrap();
        b.variable("header", Type::map(Type::String, Type::Dyn)).unwrap();
        b.variable("requestURL", Type::String).unwrap();
        b.variable("names", Type::list(Type::String)).unwrap();
        b.function(
            "size",
            vec![
                OverloadDecl::global("size_string", vec![Type::String], Type::Int),
                OverloadDecl::global("size_list", vec![Type::list(Type::Dyn)], Type::Int),
                OverloadDecl::member("string_size", vec![Type::String], Type::Int),
            ],
        )
        .unwrap();
        b.build()
    }

    fn check_src(src: &str) -> Result<CheckedAst, CheckError> {
        let env = env();
        let ast = env.parse(src).unwrap();
        env.check(&ast)
    }

    fn type_of(src: &str) -> Type {
        check_src(src).unwrap().result_type
    }

    #[test]
    fn test_literals_and_variables() {
        assert_eq!(type_of("'ok'"), Type::String);
        assert_eq!(type_of("1u"), Type::UInt);
        assert_eq!(type_of("requestURL"), Type::String);
        assert_eq!(type_of("body.x"), Type::Dyn);
        assert_eq!(type_of("header['X']"), Type::Dyn);
    }

    #[test]
    fn test_undeclared_reference() {
        let err = check_src("nope.x == 1").unwrap_err();
        assert_eq!(err.issues, vec!["undeclared reference to 'nope'".to_string()]);
        let err = check_src("missing(1)").unwrap_err();
        assert!(err.issues[0].contains("'missing'"));
    }

    #[test]
    fn test_arithmetic_types() {
        assert_eq!(type_of("1 + 2"), Type::Int);
        assert_eq!(type_of("1 + 2.5"), Type::Double);
        assert_eq!(type_of("body.x + 1"), Type::Dyn);
        assert_eq!(type_of("'a' + 'b'"), Type::String);
        assert_eq!(type_of("[1] + [2.0]"), Type::list(Type::Dyn));
        assert!(check_src("1 + 'a'").is_err());
        assert!(check_src("1.5 % 2.0").is_err());
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(type_of("body.x == 1 && requestURL != ''"), Type::Bool);
        assert_eq!(type_of("1 < 2.5"), Type::Bool);
        assert!(check_src("'a' < 1").is_err());
        assert!(check_src("1 && true").is_err());
        assert!(check_src("!1").is_err());
    }

    #[test]
    fn test_in_operator() {
        assert_eq!(type_of("'a' in names"), Type::Bool);
        assert_eq!(type_of("'X' in header"), Type::Bool);
        assert!(check_src("1 in names").is_err());
        assert!(check_src("1 in 'abc'").is_err());
    }

    #[test]
    fn test_overload_resolution_records_candidates() {
        let checked = check_src("size(names)").unwrap();
        assert_eq!(checked.result_type, Type::Int);
        match checked.expr {
            Expr::Call { overloads, .. } => assert_eq!(overloads, vec!["size_list".to_string()]),
            other => panic!("Expected Call, got {:?}", other),
        }

        // dyn argument keeps every global overload as a candidate
        match check_src("size(body.items)").unwrap().expr {
            Expr::Call { overloads, .. } => assert_eq!(overloads.len(), 2),
            other => panic!("Expected Call, got {:?}", other),
        }

        assert_eq!(type_of("requestURL.size()"), Type::Int);
        let err = check_src("size(1)").unwrap_err();
        assert!(err.issues[0].contains("no matching overload for 'size'"));
    }

    #[test]
    fn test_select_on_scalar_rejected() {
        assert!(check_src("requestURL.host").is_err());
        assert!(check_src("requestURL[0]").is_err());
    }

    #[test]
    fn test_comprehension_scopes_variable() {
        assert_eq!(type_of("names.all(n, n.size() > 1)"), Type::Bool);
        assert_eq!(type_of("names.map(n, n.size())"), Type::list(Type::Int));
        assert_eq!(type_of("names.filter(n, n != '')"), Type::list(Type::String));
        // the loop variable does not leak
        assert!(check_src("names.all(n, true) && n == ''").is_err());
        assert!(check_src("names.all(n, 1)").is_err());
    }

    #[test]
    fn test_conditional() {
        assert_eq!(type_of("true ? 1 : 2"), Type::Int);
        assert_eq!(type_of("true ? 1 : 'a'"), Type::Dyn);
        assert!(check_src("1 ? 1 : 2").is_err());
    }

    #[test]
    fn test_collects_every_issue() {
        let err = check_src("a + b").unwrap_err();
        assert_eq!(err.issues.len(), 2);
    }
}
