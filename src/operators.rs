//! Arithmetic and conversion rules for expression values.
//!
//! Values follow JavaScript number semantics: integral results are stored as
//! integers, everything else as floats.

use crate::errors::{EvalError, Result};
use itertools::Itertools;
use serde_json::{Number, Value};

/// Smallest integer magnitude that can no longer be represented exactly as f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::FloorDiv => "//",
            ArithOp::Rem => "%",
            ArithOp::Pow => "^",
        }
    }
}

/// Normalise a float into a JSON number, collapsing integral values to i64.
pub fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
        return Value::from(f as i64);
    }
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// `Number(value)` as JavaScript would compute it, `None` for NaN.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                Some(0.0)
            } else {
                t.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// String conversion used by concatenation and the string transforms.
pub fn to_js_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        Value::Array(items) => items
            .iter()
            .map(|v| if v.is_null() { String::new() } else { to_js_string(v) })
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

pub fn arithmetic(op: ArithOp, left: &Value, right: &Value) -> Result<Value> {
    if op == ArithOp::Add && (left.is_string() || right.is_string()) {
        return Ok(Value::String(format!(
            "{}{}",
            to_js_string(left),
            to_js_string(right)
        )));
    }
    if let (Some(a), Some(b)) = (as_integer(left), as_integer(right)) {
        let exact = match op {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Rem if b != 0 => a.checked_rem(b),
            _ => None,
        };
        if let Some(r) = exact {
            return Ok(Value::from(r));
        }
    }
    let (a, b) = match (to_number(left), to_number(right)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(EvalError::Runtime(format!(
                "cannot apply '{}' to {} and {}",
                op.symbol(),
                type_name(left),
                type_name(right)
            )))
        }
    };
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div | ArithOp::FloorDiv | ArithOp::Rem if b == 0.0 => {
            return Err(EvalError::Runtime("division by zero".into()))
        }
        ArithOp::Div => a / b,
        ArithOp::FloorDiv => (a / b).floor(),
        ArithOp::Rem => a % b,
        ArithOp::Pow => a.powf(b),
    };
    if !result.is_finite() {
        return Err(EvalError::Runtime(format!(
            "'{}' produced a non-finite result",
            op.symbol()
        )));
    }
    Ok(number(result))
}

pub fn negate(value: &Value) -> Result<Value> {
    arithmetic(ArithOp::Sub, &Value::from(0), value)
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn concatenation_uses_js_formatting() {
        assert_eq!(
            arithmetic(ArithOp::Add, &json!(23.5), &json!("°C")).unwrap(),
            json!("23.5°C")
        );
        assert_eq!(
            arithmetic(ArithOp::Add, &json!("n="), &json!(4)).unwrap(),
            json!("n=4")
        );
        assert_eq!(to_js_string(&json!([1, null, "a"])), "1,,a");
    }

    #[test]
    fn integer_and_float_math() {
        assert_eq!(arithmetic(ArithOp::Mul, &json!(6), &json!(7)).unwrap(), json!(42));
        assert_eq!(arithmetic(ArithOp::Div, &json!(7), &json!(2)).unwrap(), json!(3.5));
        assert_eq!(arithmetic(ArithOp::Div, &json!(8), &json!(2)).unwrap(), json!(4));
        assert_eq!(arithmetic(ArithOp::FloorDiv, &json!(7), &json!(2)).unwrap(), json!(3));
        assert_eq!(arithmetic(ArithOp::Rem, &json!(7), &json!(4)).unwrap(), json!(3));
        assert_eq!(arithmetic(ArithOp::Pow, &json!(2), &json!(10)).unwrap(), json!(1024));
        assert_eq!(arithmetic(ArithOp::Sub, &json!(true), &json!(0.5)).unwrap(), json!(0.5));
    }

    #[test]
    fn rejects_meaningless_operands() {
        assert!(arithmetic(ArithOp::Mul, &json!("abc"), &json!(2)).is_err());
        assert!(arithmetic(ArithOp::Div, &json!(1), &json!(0)).is_err());
        assert!(arithmetic(ArithOp::Sub, &json!([1]), &json!(1)).is_err());
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&Value::Null));
        assert!(truthy(&json!("0")));
        assert!(truthy(&json!([])));
    }
}
