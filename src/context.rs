use crate::coercion::coerce_value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A reported measure or a declared attribute of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default)]
    pub name: String,
    /// Alternate lookup key, interchangeable with `name`.
    #[serde(
        rename = "object_id",
        alias = "alternateId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub alternate_id: Option<String>,
    #[serde(rename = "type", default)]
    pub attr_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl Attribute {
    pub fn measure(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn expression(
        name: impl Into<String>,
        attr_type: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            attr_type: attr_type.into(),
            expression: Some(expression.into()),
            ..Self::default()
        }
    }

    pub fn with_alternate_id(mut self, id: impl Into<String>) -> Self {
        self.alternate_id = Some(id.into());
        self
    }

    /// The expression, if one is declared and non-empty.
    pub fn declared_expression(&self) -> Option<&str> {
        self.expression.as_deref().filter(|e| !e.is_empty())
    }
}

/// An attribute whose expression has been replaced by its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attr_type: String,
    #[serde(
        rename = "object_id",
        alias = "alternateId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub alternate_id: Option<String>,
    pub value: Value,
}

/// Identifier -> coerced value, built fresh for every resolution pass.
///
/// A key may be bound without a value: the measure was reported but carried
/// nothing. Such a slot reads as undefined rather than as a missing name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationContext(BTreeMap<String, Option<Value>>);

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value bound to `key`, if the key is bound to a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).and_then(Option::as_ref)
    }

    /// `None` when `key` is unbound, `Some(None)` when it is bound but undefined.
    pub fn slot(&self, key: &str) -> Option<Option<&Value>> {
        self.0.get(key).map(Option::as_ref)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), Some(value));
    }

    pub fn insert_undefined(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), None);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, Option<&Value>)> {
        self.0.iter().map(|(k, v)| (k, v.as_ref()))
    }

    fn bind(&mut self, key: &str, value: Option<Value>) {
        self.0.insert(key.to_string(), value);
    }
}

impl From<Map<String, Value>> for EvaluationContext {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl FromIterator<(String, Value)> for EvaluationContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}

/// Build the evaluation context from a list of reported attributes.
///
/// Each value is coerced once and stored under `name` and, when present,
/// under the alternate id as well. Attributes with neither contribute nothing.
/// A measure without a value still binds its keys, as undefined.
pub fn extract_context(attributes: &[Attribute]) -> EvaluationContext {
    let mut ctx = EvaluationContext::new();
    for attribute in attributes {
        let value = coerce_value(attribute.value.as_ref());
        if let Some(id) = attribute.alternate_id.as_deref().filter(|id| !id.is_empty()) {
            ctx.bind(id, value.clone());
        }
        if !attribute.name.is_empty() {
            ctx.bind(&attribute.name, value);
        }
    }
    ctx
}
