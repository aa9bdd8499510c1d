use std::sync::Arc;

use thiserror::Error;

use super::value::Value;
use crate::types::{TypeRegistry, ValueType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Cannot parse '{expression}' as {target}: {message}")]
    Parse {
        expression: String,
        target: ValueType,
        message: String,
    },
    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: ValueType,
        found: String,
    },
    #[error("Operator '{operator}' is not supported for {actual}")]
    UnsupportedOperator { operator: String, actual: String },
    #[error("Evaluation failed: {0}")]
    Failed(String),
}

pub type EvalResult<T> = Result<T, EvaluationError>;

/// Where an expression comes from, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EvaluationContext {
    pub fact_type: String,
    pub logical_path: String,
}

impl EvaluationContext {
    pub fn new(fact_type: &str, logical_path: &str) -> Self {
        Self {
            fact_type: fact_type.to_string(),
            logical_path: logical_path.to_string(),
        }
    }
}

/// The shape of an EXPECTED cell once classified.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedValue {
    /// Compared for structural equality with the actual field value.
    Literal(Value),
    /// Predicate expression checked by [`ExpressionEvaluator::matches`].
    Condition(String),
    /// Satisfied only when reading the actual field raises an error.
    ExpectError,
    /// Cell not expressed; produces no expectation.
    Absent,
}

impl ExpectedValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, ExpectedValue::Absent)
    }
}

impl std::fmt::Display for ExpectedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpectedValue::Literal(value) => write!(f, "{}", value),
            ExpectedValue::Condition(expression) => write!(f, "{}", expression),
            ExpectedValue::ExpectError => write!(f, "<error>"),
            ExpectedValue::Absent => write!(f, "<not expressed>"),
        }
    }
}

/// Parses cell expressions into values and checks conditions against actual
/// values.
#[mockall::automock]
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluates `expression` as a value of `target`.
    fn evaluate(
        &self,
        expression: &str,
        target: &ValueType,
        context: &EvaluationContext,
    ) -> EvalResult<Value>;

    /// Checks whether `actual` satisfies `expression`.
    fn matches(
        &self,
        expression: &str,
        actual: &Value,
        target: &ValueType,
        context: &EvaluationContext,
    ) -> EvalResult<bool>;

    /// Decides whether an expected expression is a plain literal or a
    /// condition. Anything that does not evaluate as a literal is kept as a
    /// condition and checked later.
    fn classify(
        &self,
        expression: &str,
        target: &ValueType,
        context: &EvaluationContext,
    ) -> ExpectedValue {
        match self.evaluate(expression, target, context) {
            Ok(value) => ExpectedValue::Literal(value),
            Err(_) => ExpectedValue::Condition(expression.to_string()),
        }
    }
}

/// Creates the evaluator used for one scenario.
pub trait EvaluatorProvider: Send + Sync {
    fn create(&self, registry: &Arc<TypeRegistry>) -> Arc<dyn ExpressionEvaluator>;
}

impl<F> EvaluatorProvider for F
where
    F: Fn(&Arc<TypeRegistry>) -> Arc<dyn ExpressionEvaluator> + Send + Sync,
{
    fn create(&self, registry: &Arc<TypeRegistry>) -> Arc<dyn ExpressionEvaluator> {
        self(registry)
    }
}
