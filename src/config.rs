use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What `apply_expression` yields when an expression evaluates to nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Fallback {
    /// The expression text itself.
    #[default]
    Expression,
    Null,
    Value(Value),
}

impl Fallback {
    pub fn resolve(&self, expression: &str) -> Value {
        match self {
            Fallback::Expression => Value::String(expression.to_string()),
            Fallback::Null => Value::Null,
            Fallback::Value(v) => v.clone(),
        }
    }
}

/// Knobs for a [`crate::JexlParser`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    pub fallback: Fallback,
    /// Keep parsed expressions around between evaluations.
    pub cache_expressions: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            fallback: Fallback::Expression,
            cache_expressions: true,
        }
    }
}
