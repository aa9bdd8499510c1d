use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::data::{MismatchKind, ResultState, ScenarioResult};
use super::error::ScenarioError;
use super::notifier::EachTestNotifier;
use crate::model::Scenario;

/// One failing EXPECTED cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellMismatch {
    pub column_index: usize,
    pub label: String,
    pub expected: String,
    /// `None` when the cell was never evaluated.
    pub kind: Option<MismatchKind>,
}

impl CellMismatch {
    pub fn actual(&self) -> String {
        match &self.kind {
            Some(kind) => kind.describe_actual(),
            None => "<not evaluated>".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind.as_ref().is_some_and(MismatchKind::is_error)
    }
}

impl std::fmt::Display for CellMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: expected {}, actual {}",
            self.label,
            self.expected,
            self.actual()
        )
    }
}

/// Every mismatching cell of one scenario.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionFailure {
    pub scenario: String,
    pub mismatches: Vec<CellMismatch>,
}

impl std::fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scenario '{}' failed with {} mismatch(es)",
            self.scenario,
            self.mismatches.len()
        )?;
        for mismatch in &self.mismatches {
            write!(f, "\n  - {}", mismatch)?;
        }
        Ok(())
    }
}

/// Logical AND over the result flags; a result that was never evaluated
/// counts as failed.
pub fn scenario_passed(results: &[ScenarioResult]) -> bool {
    results.iter().all(ScenarioResult::is_matched)
}

/// Collects every failing result of `scenario` in column order. Does not
/// stop at the first.
pub fn collect_mismatches(results: &[ScenarioResult], scenario: &Scenario) -> Option<AssertionFailure> {
    let mut mismatches: Vec<CellMismatch> = results
        .iter()
        .filter(|result| !result.is_matched())
        .map(|result| CellMismatch {
            column_index: result.column_index(),
            label: result.label.clone(),
            expected: result.expected.to_string(),
            kind: match result.state() {
                ResultState::Mismatched(kind) => Some(kind.clone()),
                _ => None,
            },
        })
        .collect();
    mismatches.sort_by_key(|mismatch| mismatch.column_index);
    if mismatches.is_empty() {
        None
    } else {
        Some(AssertionFailure {
            scenario: scenario.description.clone(),
            mismatches,
        })
    }
}

/// Reports one structured failure listing all mismatches, or nothing when
/// every result matched. Returns whether the scenario passed.
pub fn validate_assertion(
    results: &[ScenarioResult],
    scenario: &Scenario,
    notifier: &mut EachTestNotifier<'_>,
) -> bool {
    match collect_mismatches(results, scenario) {
        None => {
            debug!("scenario '{}' passed {} check(s)", scenario.description, results.len());
            true
        }
        Some(failure) => {
            debug!(
                "scenario '{}' has {} mismatch(es)",
                scenario.description,
                failure.mismatches.len()
            );
            notifier.add_failure(&ScenarioError::Assertion(failure));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{ExpectedValue, Value};
    use crate::model::{CellValue, FactMappingValue};
    use crate::runner::data::ExpectedCheck;
    use crate::runner::notifier::{Description, FailureKind, RecordingNotifier};
    use crate::types::{ResolvedField, ValueType};

    fn check(column: usize) -> ExpectedCheck {
        ExpectedCheck {
            cell: FactMappingValue::new(column, CellValue::expression("true")),
            label: format!("Person.col{}", column),
            field: ResolvedField {
                fact_type: "Person".to_string(),
                segments: vec![],
                logical_path: "Person".to_string(),
                value_type: ValueType::Boolean,
            },
            expected: ExpectedValue::Literal(Value::Boolean(true)),
        }
    }

    fn result(column: usize, state: Option<MismatchKind>) -> ScenarioResult {
        let mut result = ScenarioResult::new(&check(column));
        match state {
            None => result.set_matched(),
            Some(kind) => result.set_mismatch(kind),
        }
        result
    }

    #[test]
    fn test_all_matching_reports_nothing() {
        let results = vec![result(0, None), result(1, None)];
        let mut recorder = RecordingNotifier::new();
        let mut each = EachTestNotifier::new(&mut recorder, Description::test("ok"));

        assert!(validate_assertion(&results, &Scenario::new("ok"), &mut each));
        assert!(each.fire_test_finished().is_none());
        assert!(recorder.failures().is_empty());
    }

    #[test]
    fn test_every_mismatch_is_listed() {
        let results = vec![
            result(0, Some(MismatchKind::ValueDiffers { actual: Value::Boolean(false) })),
            result(1, None),
            result(2, Some(MismatchKind::MissingFact)),
        ];
        let mut recorder = RecordingNotifier::new();
        let mut each = EachTestNotifier::new(&mut recorder, Description::test("bad"));

        assert!(!validate_assertion(&results, &Scenario::new("bad"), &mut each));
        each.fire_test_finished();

        let failures = recorder.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Assertion);
        let columns: Vec<usize> = failures[0].mismatches.iter().map(|m| m.column_index).collect();
        assert_eq!(columns, vec![0, 2]);
        assert_eq!(
            failures[0].mismatches[0].to_string(),
            "Person.col0: expected true, actual false"
        );
    }

    #[test]
    fn test_not_evaluated_counts_as_failure() {
        let pending = ScenarioResult::new(&check(0));
        assert_eq!(pending.result(), None);
        assert!(!scenario_passed(&[pending.clone()]));

        let failure = collect_mismatches(&[pending], &Scenario::new("s")).unwrap();
        assert_eq!(failure.mismatches[0].actual(), "<not evaluated>");
        assert!(!failure.mismatches[0].is_error());
    }
}
