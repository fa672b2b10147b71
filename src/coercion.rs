use serde_json::{Number, Value};

/// Convert raw measure text into its best-fit JSON scalar.
///
/// Order: non-integral float, integer (decimal or `0x` hex), `true`/`false`,
/// then the text itself. Surrounding whitespace is ignored for the numeric
/// attempts only; unmatched text is returned untouched.
pub fn coerce(raw: &str) -> Value {
    let text = raw.trim();
    if let Some(i) = parse_hex(text) {
        return Value::from(i);
    }
    if let Some(f) = parse_finite(text) {
        if f.fract() != 0.0 {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
        if let Ok(i) = text.parse::<i64>() {
            return Value::from(i);
        }
        // "5.0", "1e3": integral value written as a float.
        // i64::MAX as f64 rounds up to 2^63, which no i64 holds.
        if f >= i64::MIN as f64 && f < i64::MAX as f64 {
            return Value::from(f as i64);
        }
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Coerce a reported value that may already be typed.
///
/// Text goes through [`coerce`]; numbers, booleans and composite values are
/// kept as reported; an absent value stays absent.
pub fn coerce_value(raw: Option<&Value>) -> Option<Value> {
    match raw {
        Some(Value::String(s)) => Some(coerce(s)),
        Some(other) => Some(other.clone()),
        None => None,
    }
}

fn parse_hex(text: &str) -> Option<i64> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    i64::from_str_radix(digits, 16).ok()
}

fn parse_finite(text: &str) -> Option<f64> {
    // Rust accepts "inf"/"NaN" spellings; measures never mean those.
    if text.is_empty()
        || !text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }
    text.parse::<f64>().ok().filter(|f| f.is_finite())
}
