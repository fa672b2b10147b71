use thiserror::Error;

/// Failures raised by the expression evaluator itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("undefined reference: {0}")]
    UndefinedReference(String),

    #[error("unknown transform: {0}")]
    UnknownTransform(String),

    #[error("transform {name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("transform {name} failed: {reason}")]
    Transform { name: String, reason: String },

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// An expression that could not be evaluated against the given context.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid expression: {expression}")]
pub struct InvalidExpression {
    pub expression: String,
    #[source]
    pub source: EvalError,
}

impl InvalidExpression {
    pub fn new(expression: impl Into<String>, source: EvalError) -> Self {
        Self {
            expression: expression.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// Transforms can only be replaced before the first evaluation.
    #[error("transform registry is sealed: an expression has already been evaluated")]
    Sealed,
}

pub type Result<T> = std::result::Result<T, EvalError>;
