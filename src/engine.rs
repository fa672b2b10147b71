use crate::config::ParserOptions;
use crate::context::{Attribute, EvaluationContext, ResolvedAttribute};
use crate::errors::{InvalidExpression, RegistryError, Result};
use crate::evaluator::{Evaluator, JexlEvaluator};
use crate::functions::{
    check_transformation_map, merge_with_builtins, TransformCheck, TransformEntry, TransformMap,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Resolves expression-defined attributes against a measure context.
///
/// Owns the evaluator and, through it, the transform registry. Transforms
/// can be changed until the first expression is evaluated; after that the
/// registry is read-only.
pub struct JexlParser<E: Evaluator = JexlEvaluator> {
    evaluator: E,
    options: ParserOptions,
    sealed: AtomicBool,
}

impl JexlParser<JexlEvaluator> {
    /// A parser with the built-in transforms installed.
    pub fn new() -> Self {
        Self::with_options(ParserOptions::default())
    }

    pub fn with_options(options: ParserOptions) -> Self {
        let transforms = TransformMap::with_builtins();
        let evaluator = if options.cache_expressions {
            JexlEvaluator::new(transforms)
        } else {
            JexlEvaluator::uncached(transforms)
        };
        Self::with_evaluator(evaluator, options)
    }
}

impl Default for JexlParser<JexlEvaluator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Evaluator> JexlParser<E> {
    pub fn with_evaluator(evaluator: E, options: ParserOptions) -> Self {
        Self {
            evaluator,
            options,
            sealed: AtomicBool::new(false),
        }
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    fn evaluate(&self, expression: &str, context: &EvaluationContext) -> Result<Option<Value>> {
        self.sealed.store(true, Ordering::Relaxed);
        self.evaluator.evaluate(expression, context)
    }

    /// Evaluate `expression`, reporting any failure as [`InvalidExpression`].
    ///
    /// An expression that yields no value resolves to null.
    pub fn parse(
        &self,
        expression: &str,
        context: &EvaluationContext,
    ) -> std::result::Result<Value, InvalidExpression> {
        let result = self
            .evaluate(expression, context)
            .map_err(|source| InvalidExpression::new(expression, source))?
            .unwrap_or(Value::Null);
        debug!(expression, ?context, %result, "parse expression");
        Ok(result)
    }

    /// Evaluate `expression` for an attribute of an entity described by
    /// `type_information`. When nothing comes out, the configured fallback
    /// (by default the expression text) is returned instead.
    pub fn apply_expression(
        &self,
        expression: &str,
        context: &EvaluationContext,
        _type_information: &Value,
    ) -> Result<Value> {
        let result = self.evaluate(expression, context)?;
        debug!(expression, ?context, ?result, "apply expression");
        Ok(result.unwrap_or_else(|| self.options.fallback.resolve(expression)))
    }

    /// `Ok(true)` when `expression` evaluates against `context`.
    pub fn context_available(
        &self,
        expression: &str,
        context: &EvaluationContext,
    ) -> std::result::Result<bool, InvalidExpression> {
        self.evaluate(expression, context)
            .map(|_| true)
            .map_err(|source| InvalidExpression::new(expression, source))
    }

    /// Resolve every attribute that declares an expression.
    ///
    /// All expressions are checked before any is resolved, so a single bad one
    /// fails the whole batch. Attributes without an expression are left out.
    pub fn process_expression_attributes(
        &self,
        type_information: &Value,
        attributes: &[Attribute],
        context: &EvaluationContext,
    ) -> std::result::Result<Vec<ResolvedAttribute>, InvalidExpression> {
        let candidates = attributes
            .iter()
            .filter_map(|a| a.declared_expression().map(|e| (a, e)))
            .map(|(a, e)| self.context_available(e, context).map(|_| (a, e)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        candidates
            .into_iter()
            .map(|(attribute, expression)| {
                let value = self
                    .apply_expression(expression, context, type_information)
                    .map_err(|source| InvalidExpression::new(expression, source))?;
                Ok(ResolvedAttribute {
                    name: attribute.name.clone(),
                    attr_type: attribute.attr_type.clone(),
                    alternate_id: attribute.alternate_id.clone(),
                    value,
                })
            })
            .collect()
    }

    /// Install caller transforms merged under the built-ins.
    ///
    /// Invalid entries are logged and dropped; the returned check tells the
    /// caller which ones.
    pub fn set_transforms(
        &mut self,
        transforms: BTreeMap<String, TransformEntry>,
    ) -> std::result::Result<TransformCheck, RegistryError> {
        if *self.sealed.get_mut() {
            warn!("transforms changed after evaluation started; ignoring");
            return Err(RegistryError::Sealed);
        }
        let check = check_transformation_map(&merge_with_builtins(transforms).into());
        if !check.error {
            self.evaluator.install_transforms(&check.valid);
        }
        info!(invalid = ?check.invalid, "{}", check.message);
        Ok(check)
    }

    pub fn is_transform(&self, identifier: &str) -> bool {
        self.evaluator.has_transform(identifier)
    }
}
