use serde::{Deserialize, Serialize};

use crate::eval::{ExpectedValue, Value};
use crate::model::{FactIdentifier, FactMappingValue};
use crate::session::FactHandle;
use crate::types::ResolvedField;

/// A fact built from the GIVEN cells of one fact identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioGiven {
    pub fact_identifier: FactIdentifier,
    pub value: Value,
}

/// One EXPECTED cell, ready to be checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedCheck {
    pub cell: FactMappingValue,
    pub label: String,
    pub field: ResolvedField,
    pub expected: ExpectedValue,
}

/// All expectations about one fact identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioExpect {
    pub fact_identifier: FactIdentifier,
    pub checks: Vec<ExpectedCheck>,
}

/// Why an expectation did not hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchKind {
    ValueDiffers { actual: Value },
    MissingFact,
    /// Reading the actual field failed while a value was expected.
    ExtractionFailed { message: String },
    /// An error was expected but the field held a value.
    UnexpectedValue { actual: Value },
    /// The expectation itself could not be evaluated.
    EvaluationFailed { message: String },
}

impl MismatchKind {
    /// Hard errors, as opposed to plain value inequality.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MismatchKind::ExtractionFailed { .. } | MismatchKind::EvaluationFailed { .. }
        )
    }

    pub fn actual(&self) -> Option<&Value> {
        match self {
            MismatchKind::ValueDiffers { actual } | MismatchKind::UnexpectedValue { actual } => {
                Some(actual)
            }
            _ => None,
        }
    }

    pub fn describe_actual(&self) -> String {
        match self {
            MismatchKind::ValueDiffers { actual } | MismatchKind::UnexpectedValue { actual } => {
                actual.to_string()
            }
            MismatchKind::MissingFact => "<no matching fact>".to_string(),
            MismatchKind::ExtractionFailed { message } => format!("<error: {}>", message),
            MismatchKind::EvaluationFailed { message } => {
                format!("<evaluation error: {}>", message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResultState {
    #[default]
    NotEvaluated,
    Matched,
    Mismatched(MismatchKind),
}

/// Outcome of one EXPECTED cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub fact_mapping_value: FactMappingValue,
    pub label: String,
    pub expected: ExpectedValue,
    pub checked_fact: Option<FactHandle>,
    state: ResultState,
}

impl ScenarioResult {
    pub fn new(check: &ExpectedCheck) -> Self {
        Self {
            fact_mapping_value: check.cell.clone(),
            label: check.label.clone(),
            expected: check.expected.clone(),
            checked_fact: None,
            state: ResultState::NotEvaluated,
        }
    }

    pub fn set_matched(&mut self) {
        self.state = ResultState::Matched;
    }

    pub fn set_mismatch(&mut self, kind: MismatchKind) {
        self.state = ResultState::Mismatched(kind);
    }

    pub fn state(&self) -> &ResultState {
        &self.state
    }

    /// `None` while not evaluated.
    pub fn result(&self) -> Option<bool> {
        match self.state {
            ResultState::NotEvaluated => None,
            ResultState::Matched => Some(true),
            ResultState::Mismatched(_) => Some(false),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.result() == Some(true)
    }

    pub fn mismatch(&self) -> Option<&MismatchKind> {
        match &self.state {
            ResultState::Mismatched(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn column_index(&self) -> usize {
        self.fact_mapping_value.column_index
    }
}

/// Working set of one scenario execution.
#[derive(Debug, Default)]
pub struct ScenarioRunnerData {
    inputs: Vec<ScenarioGiven>,
    outputs: Vec<ScenarioExpect>,
    results: Vec<ScenarioResult>,
    handles: Vec<(FactIdentifier, FactHandle)>,
    fired_rules: usize,
}

impl ScenarioRunnerData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, input: ScenarioGiven) {
        self.inputs.push(input);
    }

    pub fn add_output(&mut self, output: ScenarioExpect) {
        self.outputs.push(output);
    }

    pub fn add_result(&mut self, result: ScenarioResult) {
        self.results.push(result);
    }

    pub fn record_insertion(&mut self, fact_identifier: FactIdentifier, handle: FactHandle) {
        self.handles.push((fact_identifier, handle));
    }

    pub fn set_fired_rules(&mut self, fired: usize) {
        self.fired_rules = fired;
    }

    pub fn inputs(&self) -> &[ScenarioGiven] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ScenarioExpect] {
        &self.outputs
    }

    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    pub fn handles(&self) -> &[(FactIdentifier, FactHandle)] {
        &self.handles
    }

    pub fn fired_rules(&self) -> usize {
        self.fired_rules
    }

    /// Handle under which `fact_identifier` was inserted, if it was given.
    pub fn handle_of(&self, fact_identifier: &FactIdentifier) -> Option<FactHandle> {
        self.handles
            .iter()
            .find(|(id, _)| id == fact_identifier)
            .map(|(_, handle)| *handle)
    }

    pub fn into_results(self) -> Vec<ScenarioResult> {
        self.results
    }
}
