//! Small expression language evaluated against an [`EvaluationContext`].
//!
//! The only name in scope is `ctx`, plus a fixed set of builtin functions. There is no
//! assignment, import or attribute access outside of `ctx` and mapping values.

pub mod interpreter;
pub mod lexer;
pub mod parser;

use serde_json::Value;
use thiserror::Error;
use verity_types::EvaluationContext;

pub use interpreter::BUILTINS;
pub use parser::Expr;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("Name '{0}' is not defined")]
    Name(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Attribute error: {0}")]
    Attribute(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Division by zero")]
    ZeroDivision,
}

impl ExpressionError {
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        ExpressionError::Syntax {
            message: message.into(),
            position,
        }
    }
}

/// Parsed expression, reusable across contexts
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    ast: Expr,
}

impl CompiledExpression {
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        Ok(CompiledExpression {
            source: source.to_string(),
            ast: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<Value, ExpressionError> {
        interpreter::Interpreter::new(ctx).evaluate(&self.ast)
    }
}
