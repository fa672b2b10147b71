use crate::errors::{EvalError, Result};
use itertools::Itertools;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

pub mod builtins;

/// A named function callable from an expression as `value|name(args)`.
pub trait Transform: Send + Sync {
    /// Accepted argument counts, the piped value included.
    fn arity(&self) -> RangeInclusive<usize> {
        0..=usize::MAX
    }
    fn call(&self, args: &[Value]) -> Result<Value>;
}

/// Adapter turning a closure into a [`Transform`].
pub struct FnTransform<F> {
    arity: RangeInclusive<usize>,
    f: F,
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync,
{
    fn arity(&self) -> RangeInclusive<usize> {
        self.arity.clone()
    }

    fn call(&self, args: &[Value]) -> Result<Value> {
        (self.f)(args)
    }
}

pub fn from_fn<F>(f: F) -> FnTransform<F>
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync,
{
    FnTransform {
        arity: 0..=usize::MAX,
        f,
    }
}

pub fn from_fn_with_arity<F>(arity: RangeInclusive<usize>, f: F) -> FnTransform<F>
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync,
{
    FnTransform { arity, f }
}

/// One entry of a caller-supplied transform map.
///
/// Maps usually come from configuration, where an entry may name something
/// that is not a function at all; such entries are rejected at registration.
#[derive(Clone)]
pub enum TransformEntry {
    Function(Arc<dyn Transform>),
    Value(Value),
}

impl TransformEntry {
    pub fn function<T: Transform + 'static>(t: T) -> Self {
        TransformEntry::Function(Arc::new(t))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, TransformEntry::Function(_))
    }
}

impl fmt::Debug for TransformEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformEntry::Function(_) => f.write_str("Function(..)"),
            TransformEntry::Value(v) => write!(f, "Value({v})"),
        }
    }
}

/// Candidate input for [`check_transformation_map`].
#[derive(Debug, Clone, Default)]
pub enum TransformInput {
    #[default]
    Absent,
    Map(BTreeMap<String, TransformEntry>),
    /// Anything that is not a name -> entry mapping.
    Other(Value),
}

impl From<BTreeMap<String, TransformEntry>> for TransformInput {
    fn from(map: BTreeMap<String, TransformEntry>) -> Self {
        TransformInput::Map(map)
    }
}

impl From<Option<BTreeMap<String, TransformEntry>>> for TransformInput {
    fn from(map: Option<BTreeMap<String, TransformEntry>>) -> Self {
        map.map_or(TransformInput::Absent, TransformInput::Map)
    }
}

/// Outcome of validating a transform map.
#[derive(Clone)]
pub struct TransformCheck {
    /// Set when the input was not a mapping at all.
    pub error: bool,
    pub message: String,
    pub valid: TransformMap,
    pub invalid: Vec<String>,
}

impl fmt::Debug for TransformCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformCheck")
            .field("error", &self.error)
            .field("message", &self.message)
            .field("valid", &self.valid.names())
            .field("invalid", &self.invalid)
            .finish()
    }
}

pub const NO_TRANSFORMS_MESSAGE: &str = "No transformations were added to JEXL parser";
pub const TRANSFORMS_ADDED_MESSAGE: &str = "Transformations can be added to JEXL parser";

/// Partition a candidate map into callable entries and rejected names.
pub fn check_transformation_map(input: &TransformInput) -> TransformCheck {
    let mut check = TransformCheck {
        error: false,
        message: NO_TRANSFORMS_MESSAGE.to_string(),
        valid: TransformMap::new(),
        invalid: Vec::new(),
    };
    let map = match input {
        TransformInput::Other(_) => {
            check.error = true;
            return check;
        }
        TransformInput::Absent => return check,
        TransformInput::Map(map) if map.is_empty() => return check,
        TransformInput::Map(map) => map,
    };

    for (name, entry) in map {
        match entry {
            TransformEntry::Function(f) => check.valid.insert_arc(name.clone(), Arc::clone(f)),
            TransformEntry::Value(_) => check.invalid.push(name.clone()),
        }
    }
    check.message = if check.invalid.is_empty() {
        TRANSFORMS_ADDED_MESSAGE.to_string()
    } else {
        format!("{} must be a function", check.invalid.iter().join(","))
    };
    check
}

/// Merge the caller map with the built-in map; built-ins win on collision.
pub fn merge_with_builtins(
    caller: BTreeMap<String, TransformEntry>,
) -> BTreeMap<String, TransformEntry> {
    let mut merged = caller;
    merged.extend(builtins::base_map());
    merged
}

/// Name -> transform table consulted by the evaluator.
#[derive(Clone, Default)]
pub struct TransformMap {
    inner: Arc<HashMap<String, Arc<dyn Transform>>>,
}

impl TransformMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut map = Self::new();
        for (name, entry) in builtins::base_map() {
            if let TransformEntry::Function(f) = entry {
                map.insert_arc(name, f);
            }
        }
        map
    }

    pub fn insert<T: Transform + 'static>(&mut self, name: impl Into<String>, t: T) {
        self.insert_arc(name.into(), Arc::new(t));
    }

    fn insert_arc(&mut self, name: String, t: Arc<dyn Transform>) {
        Arc::make_mut(&mut self.inner).insert(name, t);
    }

    /// Copy every entry of `other` into this map, replacing same-named ones.
    pub fn extend_from(&mut self, other: &TransformMap) {
        let inner = Arc::make_mut(&mut self.inner);
        for (name, t) in other.inner.iter() {
            inner.insert(name.clone(), Arc::clone(t));
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.inner.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.inner.keys().map(String::as_str).sorted().collect()
    }

    /// Invoke `name`, checking the argument count first.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let t = self
            .get(name)
            .ok_or_else(|| EvalError::UnknownTransform(name.to_string()))?;
        let arity = t.arity();
        if !arity.contains(&args.len()) {
            return Err(EvalError::Arity {
                name: name.to_string(),
                expected: describe_arity(&arity),
                got: args.len(),
            });
        }
        t.call(args).map_err(|e| match e {
            EvalError::Runtime(reason) => EvalError::Transform {
                name: name.to_string(),
                reason,
            },
            other => other,
        })
    }
}

fn describe_arity(arity: &RangeInclusive<usize>) -> String {
    match (*arity.start(), *arity.end()) {
        (a, b) if a == b => a.to_string(),
        (a, usize::MAX) => format!("at least {a}"),
        (a, b) => format!("{a} to {b}"),
    }
}
