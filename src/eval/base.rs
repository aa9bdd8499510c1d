use std::cmp::Ordering;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use super::evaluator::{
    EvalResult, EvaluationContext, EvaluationError, EvaluatorProvider, ExpectedValue,
    ExpressionEvaluator,
};
use super::value::Value;
use crate::types::{TypeRegistry, ValueType};

lazy_static! {
    static ref CLAUSE: Regex =
        Regex::new(r"^\s*(<=|>=|!=|=|<|>)?\s*(.*?)\s*$").expect("clause pattern is valid");
}

const CLAUSE_SEPARATOR: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equals,
    NotEquals,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Operator {
    fn parse(symbol: &str) -> Self {
        match symbol {
            "!=" => Operator::NotEquals,
            "<" => Operator::Less,
            "<=" => Operator::LessOrEqual,
            ">" => Operator::Greater,
            ">=" => Operator::GreaterOrEqual,
            _ => Operator::Equals,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
        }
    }
}

/// Default evaluator: literals of the declared field type plus a small
/// condition language.
///
/// A condition is one or more `;` separated clauses that must all hold. Each
/// clause is an optional comparison operator (`=`, `!=`, `<`, `<=`, `>`,
/// `>=`) followed by an operand; a bare JSON list means membership.
#[derive(Debug, Default, Clone)]
pub struct BaseExpressionEvaluator;

impl BaseExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn parse_literal(expression: &str, target: &ValueType) -> EvalResult<Value> {
        let trimmed = expression.trim();
        if trimmed.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }
        let parse_error = |message: String| EvaluationError::Parse {
            expression: expression.to_string(),
            target: *target,
            message,
        };
        match target {
            ValueType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(parse_error("expected true or false".to_string())),
            },
            ValueType::Integer => trimmed
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| parse_error(e.to_string())),
            ValueType::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| parse_error(e.to_string())),
            ValueType::String => Ok(Value::String(unquote(expression).to_string())),
            ValueType::List | ValueType::Object => {
                let json: serde_json::Value =
                    serde_json::from_str(trimmed).map_err(|e| parse_error(e.to_string()))?;
                target.coerce(Value::from(json)).ok_or_else(|| {
                    parse_error(format!("not a JSON {}", target))
                })
            }
            ValueType::Any => Ok(serde_json::from_str::<serde_json::Value>(trimmed)
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(unquote(expression).to_string()))),
        }
    }

    fn looks_like_condition(expression: &str, target: &ValueType) -> bool {
        let trimmed = expression.trim_start();
        if is_quoted(trimmed) {
            return false;
        }
        split_clauses(trimmed).len() > 1
            || ["<", ">", "=", "!="].iter().any(|op| trimmed.starts_with(op))
            || (trimmed.starts_with('[') && *target != ValueType::List)
    }

    fn check_clause(
        &self,
        clause: &str,
        actual: &Value,
        target: &ValueType,
    ) -> EvalResult<bool> {
        let captures = CLAUSE
            .captures(clause)
            .ok_or_else(|| EvaluationError::Failed(format!("malformed clause '{}'", clause)))?;
        let operator = captures.get(1).map(|m| Operator::parse(m.as_str()));
        let operand = captures.get(2).map_or("", |m| m.as_str());
        trace!("clause operator={:?} operand={}", operator, operand);

        if operator.is_none() && operand.starts_with('[') && *target != ValueType::List {
            return self.check_membership(operand, actual, target);
        }

        let operator = operator.unwrap_or(Operator::Equals);
        let expected = Self::parse_literal(operand, target)?;
        match operator {
            Operator::Equals => Ok(actual.structural_eq(&expected)),
            Operator::NotEquals => Ok(!actual.structural_eq(&expected)),
            ordering => {
                let order = compare(actual, &expected).ok_or_else(|| {
                    EvaluationError::UnsupportedOperator {
                        operator: ordering.symbol().to_string(),
                        actual: actual.type_name().to_string(),
                    }
                })?;
                Ok(match ordering {
                    Operator::Less => order == Ordering::Less,
                    Operator::LessOrEqual => order != Ordering::Greater,
                    Operator::Greater => order == Ordering::Greater,
                    _ => order != Ordering::Less,
                })
            }
        }
    }

    fn check_membership(&self, operand: &str, actual: &Value, target: &ValueType) -> EvalResult<bool> {
        let candidates = match Self::parse_literal(operand, &ValueType::List)? {
            Value::List(items) => items,
            _ => Vec::new(),
        };
        for candidate in candidates {
            let candidate = target.coerce(candidate.clone()).ok_or_else(|| {
                EvaluationError::TypeMismatch {
                    path: operand.to_string(),
                    expected: *target,
                    found: candidate.type_name().to_string(),
                }
            })?;
            if actual.structural_eq(&candidate) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// One double-quoted string with no quote inside.
fn is_quoted(expression: &str) -> bool {
    let trimmed = expression.trim();
    trimmed.len() >= 2
        && trimmed.starts_with('"')
        && trimmed.ends_with('"')
        && !trimmed[1..trimmed.len() - 1].contains('"')
}

fn unquote(expression: &str) -> &str {
    let trimmed = expression.trim();
    if is_quoted(trimmed) {
        &trimmed[1..trimmed.len() - 1]
    } else {
        expression
    }
}

/// Splits on separators outside double quotes, dropping blank clauses.
fn split_clauses(expression: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in expression.char_indices() {
        match c {
            '"' => quoted = !quoted,
            CLAUSE_SEPARATOR if !quoted => {
                clauses.push(&expression[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    clauses.push(&expression[start..]);
    clauses.retain(|clause| !clause.trim().is_empty());
    clauses
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => actual.as_f64()?.partial_cmp(&expected.as_f64()?),
    }
}

impl ExpressionEvaluator for BaseExpressionEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        target: &ValueType,
        context: &EvaluationContext,
    ) -> EvalResult<Value> {
        Self::parse_literal(expression, target).map_err(|e| match e {
            EvaluationError::Parse {
                expression,
                target,
                message,
            } => EvaluationError::Parse {
                expression,
                target,
                message: format!("{} ({})", message, context.logical_path),
            },
            other => other,
        })
    }

    fn matches(
        &self,
        expression: &str,
        actual: &Value,
        target: &ValueType,
        _context: &EvaluationContext,
    ) -> EvalResult<bool> {
        let clauses = split_clauses(expression);
        if clauses.is_empty() {
            return self.check_clause(expression, actual, target);
        }
        let mut result = true;
        for clause in clauses {
            result &= self.check_clause(clause, actual, target)?;
        }
        Ok(result)
    }

    fn classify(
        &self,
        expression: &str,
        target: &ValueType,
        context: &EvaluationContext,
    ) -> ExpectedValue {
        if Self::looks_like_condition(expression, target) {
            return ExpectedValue::Condition(expression.to_string());
        }
        match self.evaluate(expression, target, context) {
            Ok(value) => ExpectedValue::Literal(value),
            Err(_) => ExpectedValue::Condition(expression.to_string()),
        }
    }
}

/// Hands out a [`BaseExpressionEvaluator`] for every scenario.
#[derive(Debug, Default, Clone)]
pub struct BaseEvaluatorProvider;

impl EvaluatorProvider for BaseEvaluatorProvider {
    fn create(&self, _registry: &Arc<TypeRegistry>) -> Arc<dyn ExpressionEvaluator> {
        Arc::new(BaseExpressionEvaluator::new())
    }
}
