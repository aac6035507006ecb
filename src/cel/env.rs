//! Evaluation environment: the declarations expressions are checked against
//! and the implementations programs are bound to.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::ast::Ast;
use super::checker::{self, CheckedAst};
use super::decls::{FunctionDecl, OverloadDecl, VariableDecl};
use super::errors::{CheckError, CompileError, EnvError, EvalError, ParseError};
use super::parser;
use super::program::{self, Program};
use super::types::Type;
use super::value::Value;

/// A bundle of declarations installed into an [`EnvBuilder`] in one step.
pub trait Library {
    fn name(&self) -> &str;
    fn install(&self, env: &mut EnvBuilder) -> Result<(), EnvError>;
}

#[derive(Debug, Clone, Default)]
pub struct Env {
    variables: IndexMap<String, Type>,
    functions: IndexMap<String, FunctionDecl>,
    constants: Arc<HashMap<String, Value>>,
}

impl Env {
    /// Start an empty environment. Install [`StandardLibrary`](super::stdlib::StandardLibrary)
    /// for operators beyond the built-in arithmetic and comparisons.
    pub fn builder() -> EnvBuilder {
        EnvBuilder::new()
    }

    pub fn parse(&self, source: &str) -> Result<Ast, ParseError> {
        parser::parse(source)
    }

    pub fn check(&self, ast: &Ast) -> Result<CheckedAst, CheckError> {
        checker::check(self, ast)
    }

    pub fn program(&self, checked: &CheckedAst) -> Result<Program, CompileError> {
        program::compile(self, checked)
    }

    pub fn variable_type(&self, name: &str) -> Option<&Type> {
        self.variables.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn constants(&self) -> &Arc<HashMap<String, Value>> {
        &self.constants
    }
}

pub struct EnvBuilder {
    env: Env,
    constants: HashMap<String, Value>,
    overload_ids: HashSet<String>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self {
            env: Env::default(),
            constants: HashMap::new(),
            overload_ids: HashSet::new(),
        }
    }

    pub fn variable(&mut self, name: &str, ty: Type) -> Result<(), EnvError> {
        if self.env.variables.contains_key(name) {
            return Err(EnvError::DuplicateVariable(name.to_string()));
        }
        self.env.variables.insert(name.to_string(), ty);
        Ok(())
    }

    pub fn declare(&mut self, decls: &[VariableDecl]) -> Result<(), EnvError> {
        for decl in decls {
            self.variable(&decl.name, decl.ty.clone())?;
        }
        Ok(())
    }

    /// Declare a variable whose value is fixed when the environment is built.
    pub fn constant(&mut self, name: &str, ty: Type, value: Value) -> Result<(), EnvError> {
        self.variable(name, ty)?;
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    /// Declare overloads for `name`, merging with earlier declarations of the
    /// same function.
    pub fn function(&mut self, name: &str, overloads: Vec<OverloadDecl>) -> Result<(), EnvError> {
        for overload in &overloads {
            if self.overload_ids.contains(&overload.id) {
                return Err(EnvError::DuplicateOverload(overload.id.clone()));
            }
            if overload.member && overload.params.is_empty() {
                return Err(EnvError::MissingReceiver {
                    function: name.to_string(),
                    overload: overload.id.clone(),
                });
            }
        }
        self.overload_ids
            .extend(overloads.iter().map(|o| o.id.clone()));
        self.env
            .functions
            .entry(name.to_string())
            .or_insert_with(|| FunctionDecl {
                name: name.to_string(),
                overloads: Vec::new(),
            })
            .overloads
            .extend(overloads);
        Ok(())
    }

    /// Attach an implementation to an already declared overload.
    pub fn bind<F>(&mut self, overload_id: &str, f: F) -> Result<(), EnvError>
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        let overload = self
            .env
            .functions
            .values_mut()
            .flat_map(|decl| decl.overloads.iter_mut())
            .find(|o| o.id == overload_id)
            .ok_or_else(|| EnvError::UnknownOverload(overload_id.to_string()))?;
        overload.handler = Some(Arc::new(f));
        Ok(())
    }

    pub fn library(&mut self, library: &dyn Library) -> Result<(), EnvError> {
        library.install(self)
    }

    pub fn build(self) -> Env {
        let mut env = self.env;
        env.constants = Arc::new(self.constants);
        env
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::activation::Activation;

    struct Answer;

    impl Library for Answer {
        fn name(&self) -> &str {
            "answer"
        }

        fn install(&self, env: &mut EnvBuilder) -> Result<(), EnvError> {
            env.constant("answer", Type::Int, Value::Int(42))?;
            env.function(
                "twice",
                vec![OverloadDecl::global("twice_int", vec![Type::Int], Type::Int)
                    .with_impl(|args| match args {
                        [Value::Int(n)] => Ok(Value::Int(n * 2)),
                        _ => Err(EvalError::no_overload("twice", &[])),
                    })],
            )
        }
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let mut b = Env::builder();
        b.variable("body", Type::Dyn).unwrap();
        assert_eq!(
            b.variable("body", Type::String),
            Err(EnvError::DuplicateVariable("body".into()))
        );
    }

    #[test]
    fn test_declare_many() {
        let mut b = Env::builder();
        let decls = vec![
            VariableDecl { name: "a".into(), ty: Type::Int },
            VariableDecl { name: "b".into(), ty: Type::String },
        ];
        b.declare(&decls).unwrap();
        assert_eq!(b.declare(&decls[1..]), Err(EnvError::DuplicateVariable("b".into())));
        let env = b.build();
        assert_eq!(env.variables().count(), 2);
    }

    #[test]
    fn test_duplicate_overload_rejected() {
        let mut b = Env::builder();
        let decl = || vec![OverloadDecl::global("f_int", vec![Type::Int], Type::Int)];
        b.function("f", decl()).unwrap();
        assert_eq!(b.function("g", decl()), Err(EnvError::DuplicateOverload("f_int".into())));
    }

    #[test]
    fn test_member_without_receiver_rejected() {
        let mut b = Env::builder();
        let err = b
            .function("f", vec![OverloadDecl::member("f_none", vec![], Type::Int)])
            .unwrap_err();
        assert!(matches!(err, EnvError::MissingReceiver { .. }));
    }

    #[test]
    fn test_functions_merge_overloads() {
        let mut b = Env::builder();
        b.function("f", vec![OverloadDecl::global("f_int", vec![Type::Int], Type::Int)]).unwrap();
        b.function("f", vec![OverloadDecl::global("f_string", vec![Type::String], Type::Int)]).unwrap();
        let env = b.build();
        assert_eq!(env.function("f").unwrap().overloads.len(), 2);
    }

    #[test]
    fn test_bind_unknown_overload() {
        let mut b = Env::builder();
        assert_eq!(
            b.bind("missing", |_| Ok(Value::Null)),
            Err(EnvError::UnknownOverload("missing".into()))
        );
    }

    #[test]
    fn test_library_constants_and_functions_evaluate() {
        let mut b = Env::builder();
        b.library(&Answer).unwrap();
        let env = b.build();
        assert_eq!(env.variable_type("answer"), Some(&Type::Int));

        let ast = env.parse("twice(answer)").unwrap();
        let checked = env.check(&ast).unwrap();
        let program = env.program(&checked).unwrap();
        assert_eq!(program.eval(&Activation::new()).unwrap(), Value::Int(84));
    }

    #[test]
    fn test_deferred_binding() {
        let mut b = Env::builder();
        b.function("late", vec![OverloadDecl::global("late_0", vec![], Type::String)]).unwrap();
        let unbound = {
            let env = Env {
                variables: IndexMap::new(),
                functions: b.env.functions.clone(),
                constants: Arc::new(HashMap::new()),
            };
            let checked = env.check(&env.parse("late()").unwrap()).unwrap();
            env.program(&checked).unwrap_err()
        };
        assert!(matches!(unbound, CompileError::UnboundOverload { .. }));

        b.bind("late_0", |_| Ok(Value::from("bound"))).unwrap();
        let env = b.build();
        let checked = env.check(&env.parse("late()").unwrap()).unwrap();
        let program = env.program(&checked).unwrap();
        assert_eq!(program.eval(&Activation::new()).unwrap(), Value::from("bound"));
    }
}
