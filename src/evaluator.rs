use crate::context::EvaluationContext;
use crate::errors::Result;
use crate::expression::{eval_ast, parse_expr, ENode};
use crate::functions::TransformMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// The expression language capability the resolution layer is built on.
///
/// `Ok(None)` means evaluation succeeded but produced no value.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context: &EvaluationContext) -> Result<Option<Value>>;

    /// Add `transforms` to the table consulted by later evaluations.
    fn install_transforms(&mut self, transforms: &TransformMap);

    fn has_transform(&self, name: &str) -> bool;
}

/// Parsed expressions kept by [`JexlEvaluator::new`].
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// JEXL-style evaluator with a parsed-AST cache keyed by expression text.
///
/// The cache holds at most `capacity` expressions. Once full, further
/// expressions are parsed on every call instead of evicting earlier ones.
#[derive(Default)]
pub struct JexlEvaluator {
    transforms: TransformMap,
    cache: Option<RwLock<HashMap<String, Arc<ENode>>>>,
    capacity: usize,
}

impl JexlEvaluator {
    pub fn new(transforms: TransformMap) -> Self {
        Self::with_cache_capacity(transforms, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(transforms: TransformMap, capacity: usize) -> Self {
        Self {
            transforms,
            cache: Some(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// An evaluator that parses the expression on every call.
    pub fn uncached(transforms: TransformMap) -> Self {
        Self {
            transforms,
            cache: None,
            capacity: 0,
        }
    }

    pub fn transforms(&self) -> &TransformMap {
        &self.transforms
    }

    pub fn cached_expressions(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|c| c.read().ok().map(|m| m.len()))
            .unwrap_or(0)
    }

    fn compile(&self, expression: &str) -> Result<Arc<ENode>> {
        let Some(cache) = &self.cache else {
            return Ok(Arc::new(parse_expr(expression)?));
        };
        if let Some(ast) = cache.read().ok().and_then(|m| m.get(expression).cloned()) {
            return Ok(ast);
        }
        let ast = Arc::new(parse_expr(expression)?);
        if let Ok(mut m) = cache.write() {
            if m.len() < self.capacity {
                m.insert(expression.to_string(), Arc::clone(&ast));
            }
        }
        Ok(ast)
    }
}

impl Evaluator for JexlEvaluator {
    fn evaluate(&self, expression: &str, context: &EvaluationContext) -> Result<Option<Value>> {
        let ast = self.compile(expression)?;
        eval_ast(&ast, context, &self.transforms)
    }

    fn install_transforms(&mut self, transforms: &TransformMap) {
        self.transforms.extend_from(transforms);
    }

    fn has_transform(&self, name: &str) -> bool {
        self.transforms.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{extract_context, Attribute};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn caches_each_expression_once() {
        let ev = JexlEvaluator::new(TransformMap::with_builtins());
        let ctx = extract_context(&[Attribute::measure("x", "2")]);
        for _ in 0..3 {
            assert_eq!(ev.evaluate("x * 3", &ctx).unwrap(), Some(json!(6)));
        }
        assert_eq!(ev.evaluate("x|floor", &ctx).unwrap(), Some(json!(2)));
        assert_eq!(ev.cached_expressions(), 2);
    }

    #[test]
    fn cache_stops_growing_at_capacity() {
        let ev = JexlEvaluator::with_cache_capacity(TransformMap::new(), 2);
        let ctx = extract_context(&[Attribute::measure("x", "2")]);
        for n in 0..5 {
            assert_eq!(ev.evaluate(&format!("x + {n}"), &ctx).unwrap(), Some(json!(2 + n)));
        }
        assert_eq!(ev.cached_expressions(), 2);
        assert_eq!(ev.evaluate("x + 4", &ctx).unwrap(), Some(json!(6)));
        assert_eq!(ev.evaluate("x + 0", &ctx).unwrap(), Some(json!(2)));
        assert_eq!(ev.cached_expressions(), 2);
    }

    #[test]
    fn parse_failures_are_not_cached() {
        let ev = JexlEvaluator::new(TransformMap::new());
        assert!(ev.evaluate("(", &EvaluationContext::new()).is_err());
        assert_eq!(ev.cached_expressions(), 0);
    }

    #[test]
    fn uncached_evaluator_still_evaluates() {
        let ev = JexlEvaluator::uncached(TransformMap::new());
        assert_eq!(
            ev.evaluate("'a' + 1", &EvaluationContext::new()).unwrap(),
            Some(json!("a1"))
        );
        assert_eq!(ev.cached_expressions(), 0);
        assert!(!ev.has_transform("trim"));
    }
}
