//! Value model and expression evaluation.
//!
//! # Core Components
//!
//! ## Value
//! [`value::Value`] is the dynamic representation of everything a scenario
//! touches: given inputs, fact fields read back from the rule session, and
//! expected literals.
//!
//! ## Expression Evaluator
//! [`evaluator::ExpressionEvaluator`] is the contract used to turn cell
//! expressions into typed values and to check conditions against actual
//! values. Hosts can plug their own implementation through an
//! [`evaluator::EvaluatorProvider`].
//!
//! ## Base Evaluator
//! [`base::BaseExpressionEvaluator`] is the default implementation: literals
//! of the declared field type and `;` separated comparison clauses.

pub mod base;
pub mod evaluator;
pub mod value;

pub use base::{BaseEvaluatorProvider, BaseExpressionEvaluator};
pub use evaluator::{
    EvalResult, EvaluationContext, EvaluationError, EvaluatorProvider, ExpectedValue,
    ExpressionEvaluator,
};
pub use value::{FieldAccessError, Value};
