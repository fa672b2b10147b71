//! Transforms available to every expression.
//!
//! These always take precedence over caller-supplied transforms of the same
//! name.

use super::{Transform, TransformEntry};
use crate::errors::{EvalError, Result};
use crate::operators::{self, arithmetic, to_js_string, to_number, ArithOp};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use itertools::Itertools;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

type Func = fn(&[Value]) -> Result<Value>;

struct Builtin {
    arity: RangeInclusive<usize>,
    f: Func,
}

impl Transform for Builtin {
    fn arity(&self) -> RangeInclusive<usize> {
        self.arity.clone()
    }

    fn call(&self, args: &[Value]) -> Result<Value> {
        (self.f)(args)
    }
}

const BUILTINS: &[(&str, usize, usize, Func)] = &[
    ("jsonparse", 1, 1, jsonparse),
    ("jsonstringify", 1, 1, jsonstringify),
    ("indexOf", 2, 2, index_of),
    ("length", 1, 1, length),
    ("trim", 1, 1, trim),
    ("substr", 2, 3, substr),
    ("addreduce", 1, 1, addreduce),
    ("lengtharray", 1, 1, lengtharray),
    ("typeof", 1, 1, type_of),
    ("isarray", 1, 1, isarray),
    ("isnan", 1, 1, isnan),
    ("parseint", 1, 2, parseint),
    ("parsefloat", 1, 1, parsefloat),
    ("toisodate", 1, 1, toisodate),
    ("toisostring", 1, 1, toisodate),
    ("gettime", 1, 1, gettime),
    ("now", 0, 1, now),
    ("hextostring", 1, 1, hextostring),
    ("touppercase", 1, 1, touppercase),
    ("tolowercase", 1, 1, tolowercase),
    ("floor", 1, 1, floor),
    ("ceil", 1, 1, ceil),
    ("round", 1, 1, round),
    ("tofixed", 2, 2, tofixed),
    ("replacestr", 3, 3, replacestr),
    ("replaceregexp", 3, 3, replaceregexp),
    ("replaceallstr", 3, 3, replaceallstr),
    ("replaceallregexp", 3, 3, replaceallregexp),
    ("split", 2, 2, split),
    ("joinarrayelements", 2, 2, joinarrayelements),
    ("concatarray", 2, 2, concatarray),
    ("mapper", 3, 3, mapper),
    ("thmapper", 3, 3, thmapper),
    ("bitwisemask", 4, 4, bitwisemask),
    ("slice", 2, 3, slice),
    ("addset", 2, 2, addset),
    ("removeset", 2, 2, removeset),
    ("valuePicker", 2, 2, value_picker),
    ("valuePickerMulti", 2, 2, value_picker_multi),
];

/// The built-in transform table as registry entries.
pub fn base_map() -> BTreeMap<String, TransformEntry> {
    BUILTINS
        .iter()
        .map(|&(name, min, max, f)| {
            let entry: Arc<dyn Transform> = Arc::new(Builtin { arity: min..=max, f });
            (name.to_string(), TransformEntry::Function(entry))
        })
        .collect()
}

static NULL: Value = Value::Null;

fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&NULL)
}

fn text(args: &[Value], i: usize) -> String {
    to_js_string(arg(args, i))
}

fn num(args: &[Value], i: usize) -> Result<f64> {
    let v = arg(args, i);
    to_number(v).ok_or_else(|| EvalError::Runtime(format!("{v} is not a number")))
}

fn int(args: &[Value], i: usize) -> Result<i64> {
    Ok(num(args, i)?.trunc() as i64)
}

fn array(args: &[Value], i: usize) -> Result<&Vec<Value>> {
    match arg(args, i) {
        Value::Array(items) => Ok(items),
        other => Err(EvalError::Runtime(format!("{other} is not an array"))),
    }
}

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| EvalError::Runtime(format!("bad regular expression: {e}")))
}

/// Resolve a JavaScript-style start/end index against `len`, negatives counting from the end.
fn clamp_index(i: i64, len: usize) -> usize {
    if i < 0 {
        len.saturating_sub(i.unsigned_abs() as usize)
    } else {
        (i as usize).min(len)
    }
}

fn jsonparse(args: &[Value]) -> Result<Value> {
    serde_json::from_str(&text(args, 0)).map_err(|e| EvalError::Runtime(e.to_string()))
}

fn jsonstringify(args: &[Value]) -> Result<Value> {
    serde_json::to_string(arg(args, 0))
        .map(Value::String)
        .map_err(|e| EvalError::Runtime(e.to_string()))
}

fn index_of(args: &[Value]) -> Result<Value> {
    let haystack = text(args, 0);
    let needle = text(args, 1);
    Ok(match haystack.find(&needle) {
        Some(byte) => Value::from(haystack[..byte].chars().count()),
        None => Value::from(-1),
    })
}

fn length(args: &[Value]) -> Result<Value> {
    Ok(Value::from(text(args, 0).chars().count()))
}

fn trim(args: &[Value]) -> Result<Value> {
    Ok(Value::String(text(args, 0).trim().to_string()))
}

fn substr(args: &[Value]) -> Result<Value> {
    let chars: Vec<char> = text(args, 0).chars().collect();
    let start = clamp_index(int(args, 1)?, chars.len());
    let count = match args.get(2) {
        Some(_) => int(args, 2)?.max(0) as usize,
        None => chars.len(),
    };
    let end = start.saturating_add(count).min(chars.len());
    Ok(Value::String(chars[start..end].iter().collect()))
}

fn addreduce(args: &[Value]) -> Result<Value> {
    let items = array(args, 0)?;
    let (first, rest) = items
        .split_first()
        .ok_or_else(|| EvalError::Runtime("reduce of empty array".into()))?;
    rest.iter()
        .try_fold(first.clone(), |acc, v| arithmetic(ArithOp::Add, &acc, v))
}

fn lengtharray(args: &[Value]) -> Result<Value> {
    Ok(Value::from(array(args, 0)?.len()))
}

fn type_of(args: &[Value]) -> Result<Value> {
    Ok(Value::from(operators::type_name(arg(args, 0))))
}

fn isarray(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(arg(args, 0).is_array()))
}

fn isnan(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(to_number(arg(args, 0)).is_none()))
}

/// Leading decimal prefix of `s` as `parseFloat` would read it.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    &s[..end]
}

fn parseint(args: &[Value]) -> Result<Value> {
    let s = text(args, 0);
    let s = s.trim();
    let radix = match args.get(1) {
        Some(_) => int(args, 1)? as u32,
        None => 10,
    };
    if !(2..=36).contains(&radix) {
        return Ok(Value::Null);
    }
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map_or(digits.len(), |(i, _)| i);
    Ok(i64::from_str_radix(&digits[..end], radix)
        .map(|v| Value::from(sign * v))
        .unwrap_or(Value::Null))
}

fn parsefloat(args: &[Value]) -> Result<Value> {
    let s = text(args, 0);
    let prefix = numeric_prefix(s.trim_start());
    Ok(prefix
        .parse::<f64>()
        .map(operators::number)
        .unwrap_or(Value::Null))
}

fn to_datetime(value: &Value) -> Result<DateTime<Utc>> {
    let parsed = match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|d| d.and_utc())
            })
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|d| d.and_utc())
            }),
        _ => None,
    };
    parsed.ok_or_else(|| EvalError::Runtime(format!("invalid date {value}")))
}

fn toisodate(args: &[Value]) -> Result<Value> {
    let date = to_datetime(arg(args, 0))?;
    Ok(Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)))
}

fn gettime(args: &[Value]) -> Result<Value> {
    Ok(Value::from(to_datetime(arg(args, 0))?.timestamp_millis()))
}

fn now(_args: &[Value]) -> Result<Value> {
    Ok(Value::from(Utc::now().timestamp_millis()))
}

fn hextostring(args: &[Value]) -> Result<Value> {
    let hex = text(args, 0);
    let bytes = hex
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|p| u8::from_str_radix(p, 16).ok())
                .ok_or_else(|| EvalError::Runtime(format!("{hex} is not hexadecimal")))
        })
        .collect::<Result<Vec<u8>>>()?;
    Ok(Value::String(bytes.into_iter().map(char::from).collect()))
}

fn touppercase(args: &[Value]) -> Result<Value> {
    Ok(Value::String(text(args, 0).to_uppercase()))
}

fn tolowercase(args: &[Value]) -> Result<Value> {
    Ok(Value::String(text(args, 0).to_lowercase()))
}

fn floor(args: &[Value]) -> Result<Value> {
    Ok(operators::number(num(args, 0)?.floor()))
}

fn ceil(args: &[Value]) -> Result<Value> {
    Ok(operators::number(num(args, 0)?.ceil()))
}

fn round(args: &[Value]) -> Result<Value> {
    // Math.round rounds halves towards +infinity
    Ok(operators::number((num(args, 0)? + 0.5).floor()))
}

fn tofixed(args: &[Value]) -> Result<Value> {
    let value = num(args, 0)?;
    let digits = int(args, 1)?.clamp(0, 100) as usize;
    Ok(Value::String(format!("{value:.digits$}")))
}

fn replacestr(args: &[Value]) -> Result<Value> {
    Ok(Value::String(text(args, 0).replacen(&text(args, 1), &text(args, 2), 1)))
}

fn replaceallstr(args: &[Value]) -> Result<Value> {
    Ok(Value::String(text(args, 0).replace(&text(args, 1), &text(args, 2))))
}

fn replaceregexp(args: &[Value]) -> Result<Value> {
    let re = regex(&text(args, 1))?;
    Ok(Value::String(
        re.replace(&text(args, 0), text(args, 2).as_str()).into_owned(),
    ))
}

fn replaceallregexp(args: &[Value]) -> Result<Value> {
    let re = regex(&text(args, 1))?;
    Ok(Value::String(
        re.replace_all(&text(args, 0), text(args, 2).as_str())
            .into_owned(),
    ))
}

fn split(args: &[Value]) -> Result<Value> {
    let s = text(args, 0);
    let sep = text(args, 1);
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(sep.as_str()).map(Value::from).collect()
    };
    Ok(Value::Array(parts))
}

fn joinarrayelements(args: &[Value]) -> Result<Value> {
    let sep = text(args, 1);
    Ok(Value::String(
        array(args, 0)?.iter().map(to_js_string).join(&sep),
    ))
}

fn concatarray(args: &[Value]) -> Result<Value> {
    let mut out = array(args, 0)?.clone();
    match arg(args, 1) {
        Value::Array(more) => out.extend(more.iter().cloned()),
        other => out.push(other.clone()),
    }
    Ok(Value::Array(out))
}

/// `choices[i]` where `values[i]` equals the input.
fn mapper(args: &[Value]) -> Result<Value> {
    let input = arg(args, 0);
    let values = array(args, 1)?;
    let choices = array(args, 2)?;
    Ok(values
        .iter()
        .position(|v| v == input)
        .and_then(|i| choices.get(i))
        .cloned()
        .unwrap_or(Value::Null))
}

/// `choices[i]` for the last threshold `values[i]` not above the input.
fn thmapper(args: &[Value]) -> Result<Value> {
    let input = num(args, 0)?;
    let values = array(args, 1)?;
    let choices = array(args, 2)?;
    let index = values
        .iter()
        .rposition(|v| to_number(v).is_some_and(|t| t <= input))
        .unwrap_or(0);
    Ok(choices.get(index).cloned().unwrap_or(Value::Null))
}

fn bitwisemask(args: &[Value]) -> Result<Value> {
    let value = int(args, 0)?;
    let mask = int(args, 1)?;
    let shift = int(args, 3)?.clamp(0, 63) as u32;
    let masked = match text(args, 2).as_str() {
        "&" => value & mask,
        "|" => value | mask,
        "^" => value ^ mask,
        op => return Err(EvalError::Runtime(format!("unknown bitwise operator {op}"))),
    };
    Ok(Value::from(masked >> shift))
}

fn slice(args: &[Value]) -> Result<Value> {
    let bounds = |len: usize| -> Result<(usize, usize)> {
        let start = clamp_index(int(args, 1)?, len);
        let end = match args.get(2) {
            Some(_) => clamp_index(int(args, 2)?, len),
            None => len,
        };
        Ok((start, end.max(start)))
    };
    match arg(args, 0) {
        Value::Array(items) => {
            let (start, end) = bounds(items.len())?;
            Ok(Value::Array(items[start..end].to_vec()))
        }
        other => {
            let chars: Vec<char> = to_js_string(other).chars().collect();
            let (start, end) = bounds(chars.len())?;
            Ok(Value::String(chars[start..end].iter().collect()))
        }
    }
}

fn addset(args: &[Value]) -> Result<Value> {
    let item = arg(args, 1);
    let mut set: Vec<Value> = array(args, 0)?
        .iter()
        .cloned()
        .unique_by(|v| v.to_string())
        .collect();
    if !set.contains(item) {
        set.push(item.clone());
    }
    Ok(Value::Array(set))
}

fn removeset(args: &[Value]) -> Result<Value> {
    let item = arg(args, 1);
    Ok(Value::Array(
        array(args, 0)?
            .iter()
            .filter(|v| *v != item)
            .unique_by(|v| v.to_string())
            .cloned()
            .collect(),
    ))
}

fn object_entries(value: &Value) -> Result<&serde_json::Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| EvalError::Runtime(format!("{value} is not an object")))
}

/// Keys of an object whose value equals the given one.
fn value_picker(args: &[Value]) -> Result<Value> {
    let pick = arg(args, 1);
    Ok(Value::Array(
        object_entries(arg(args, 0))?
            .iter()
            .filter(|(_, v)| *v == pick)
            .map(|(k, _)| Value::String(k.clone()))
            .collect(),
    ))
}

/// Keys of an object whose value is one of the given ones.
fn value_picker_multi(args: &[Value]) -> Result<Value> {
    let picks = array(args, 1)?;
    Ok(Value::Array(
        object_entries(arg(args, 0))?
            .iter()
            .filter(|(_, v)| picks.contains(*v))
            .map(|(k, _)| Value::String(k.clone()))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::TransformMap;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn call(name: &str, args: &[Value]) -> Value {
        TransformMap::with_builtins().call(name, args).unwrap()
    }

    #[test]
    fn string_helpers() {
        assert_eq!(call("touppercase", &[json!("abc")]), json!("ABC"));
        assert_eq!(call("tolowercase", &[json!("AbC")]), json!("abc"));
        assert_eq!(call("trim", &[json!("  x ")]), json!("x"));
        assert_eq!(call("length", &[json!("°C")]), json!(2));
        assert_eq!(call("indexOf", &[json!("hello"), json!("l")]), json!(2));
        assert_eq!(call("indexOf", &[json!("hello"), json!("z")]), json!(-1));
        assert_eq!(call("substr", &[json!("hello"), json!(1), json!(3)]), json!("ell"));
        assert_eq!(call("substr", &[json!("hello"), json!(-3)]), json!("llo"));
        assert_eq!(call("split", &[json!("a,b,c"), json!(",")]), json!(["a", "b", "c"]));
        assert_eq!(
            call("replacestr", &[json!("a-b-c"), json!("-"), json!("+")]),
            json!("a+b-c")
        );
        assert_eq!(
            call("replaceallregexp", &[json!("a1b22c"), json!("[0-9]+"), json!("#")]),
            json!("a#b#c")
        );
        assert_eq!(call("hextostring", &[json!("48656c6c6f")]), json!("Hello"));
    }

    #[test]
    fn number_helpers() {
        assert_eq!(call("parseint", &[json!("42px")]), json!(42));
        assert_eq!(call("parseint", &[json!("ff"), json!(16)]), json!(255));
        assert_eq!(call("parseint", &[json!("px")]), Value::Null);
        assert_eq!(call("parsefloat", &[json!("3.25 kg")]), json!(3.25));
        assert_eq!(call("round", &[json!(2.5)]), json!(3));
        assert_eq!(call("round", &[json!(-2.5)]), json!(-2));
        assert_eq!(call("floor", &[json!(2.7)]), json!(2));
        assert_eq!(call("ceil", &[json!(2.1)]), json!(3));
        assert_eq!(call("tofixed", &[json!(3.14159), json!(2)]), json!("3.14"));
        assert_eq!(call("isnan", &[json!("abc")]), json!(true));
        assert_eq!(call("isnan", &[json!("12")]), json!(false));
        assert_eq!(
            call("bitwisemask", &[json!(0b1101), json!(0b0110), json!("&"), json!(1)]),
            json!(2)
        );
    }

    #[test]
    fn array_helpers() {
        assert_eq!(call("addreduce", &[json!([1, 2, 3.5])]), json!(6.5));
        assert_eq!(call("lengtharray", &[json!([1, 2])]), json!(2));
        assert_eq!(call("joinarrayelements", &[json!([1, "a"]), json!("-")]), json!("1-a"));
        assert_eq!(call("concatarray", &[json!([1]), json!([2, 3])]), json!([1, 2, 3]));
        assert_eq!(call("slice", &[json!([1, 2, 3, 4]), json!(1), json!(-1)]), json!([2, 3]));
        assert_eq!(call("addset", &[json!([1, 1, 2]), json!(3)]), json!([1, 2, 3]));
        assert_eq!(call("removeset", &[json!([1, 2, 2]), json!(1)]), json!([2]));
        assert_eq!(
            call("mapper", &[json!("b"), json!(["a", "b"]), json!(["A", "B"])]),
            json!("B")
        );
        assert_eq!(
            call("thmapper", &[json!(15), json!([0, 10, 20]), json!(["low", "mid", "high"])]),
            json!("mid")
        );
    }

    #[test]
    fn object_and_json_helpers() {
        assert_eq!(call("jsonparse", &[json!("{\"a\":1}")]), json!({"a": 1}));
        assert_eq!(call("jsonstringify", &[json!({"a": 1})]), json!("{\"a\":1}"));
        assert_eq!(call("typeof", &[json!(1.5)]), json!("number"));
        assert_eq!(call("isarray", &[json!([])]), json!(true));
        assert_eq!(
            call("valuePicker", &[json!({"a": 1, "b": 2, "c": 1}), json!(1)]),
            json!(["a", "c"])
        );
        assert_eq!(
            call("valuePickerMulti", &[json!({"a": 1, "b": 2, "c": 3}), json!([1, 3])]),
            json!(["a", "c"])
        );
    }

    #[test]
    fn date_helpers() {
        assert_eq!(call("toisodate", &[json!(0)]), json!("1970-01-01T00:00:00.000Z"));
        assert_eq!(call("gettime", &[json!("1970-01-02")]), json!(86_400_000));
        assert!(TransformMap::with_builtins()
            .call("toisodate", &[json!("yesterday")])
            .is_err());
    }
}
