pub mod errors;
pub mod coercion;
pub mod config;
pub mod context;
pub mod engine;     // attribute resolution on top of an evaluator
pub mod evaluator;
pub mod functions;  // transform registry and built-ins
mod expression;
mod parser;
mod operators;
mod comparison;

use serde_json::Value;

pub use coercion::{coerce, coerce_value};
pub use config::{Fallback, ParserOptions};
pub use context::{extract_context, Attribute, EvaluationContext, ResolvedAttribute};
pub use engine::JexlParser;
pub use errors::{EvalError, InvalidExpression, RegistryError};
pub use evaluator::{Evaluator, JexlEvaluator};
pub use functions::{
    check_transformation_map, Transform, TransformCheck, TransformEntry, TransformInput,
    TransformMap,
};

/// Convenience: evaluate one expression with the built-in transforms.
pub fn eval(expression: &str, context: &EvaluationContext) -> Result<Value, InvalidExpression> {
    JexlParser::with_options(ParserOptions {
        cache_expressions: false,
        ..ParserOptions::default()
    })
    .parse(expression, context)
}
