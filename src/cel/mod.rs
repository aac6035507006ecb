//! A small CEL engine.
//!
//! Expressions go through four stages:
//! 1. [`Env::parse`] - source text to [`Ast`], expanding macros
//! 2. [`Env::check`] - resolve names and overloads against the declarations
//! 3. [`Env::program`] - bind every call to its implementation
//! 4. [`Program::eval`] - run against an [`Activation`]

pub mod activation;
pub mod ast;
pub mod checker;
pub mod decls;
pub mod env;
pub mod errors;
pub mod ext_strings;
pub mod interpreter;
pub mod lexer;
pub mod operations;
pub mod parser;
pub mod program;
pub mod stdlib;
pub mod types;
pub mod value;

pub use activation::Activation;
pub use ast::Ast;
pub use checker::CheckedAst;
pub use decls::{FunctionDecl, Handler, OverloadDecl, VariableDecl};
pub use env::{Env, EnvBuilder, Library};
pub use errors::{CheckError, CompileError, EnvError, EvalError, ParseError};
pub use ext_strings::StringsLibrary;
pub use program::Program;
pub use stdlib::StandardLibrary;
pub use types::Type;
pub use value::{Key, Value};
