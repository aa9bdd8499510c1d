use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::descriptor::{FactMappingType, SimulationDescriptor};
use crate::eval::value::Value;

/// Raw content of a scenario cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    NotExpressed,
    /// Marks an EXPECTED cell whose field is expected to fail evaluation.
    ExpectError,
    /// A string expression, or any structured JSON literal.
    Raw(serde_json::Value),
}

impl CellValue {
    pub fn expression(expression: &str) -> Self {
        CellValue::Raw(serde_json::Value::String(expression.to_string()))
    }

    pub fn is_expressed(&self) -> bool {
        !matches!(self, CellValue::NotExpressed)
    }
}

/// Verification status written back to EXPECTED cells after a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactMappingValueStatus {
    #[default]
    NotEvaluated,
    Success,
    FailedWithError,
}

/// One cell of a scenario row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactMappingValue {
    pub column_index: usize,
    #[serde(default)]
    pub value: CellValue,
    #[serde(default)]
    pub status: FactMappingValueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_value: Option<Value>,
}

impl FactMappingValue {
    pub fn new(column_index: usize, value: CellValue) -> Self {
        Self {
            column_index,
            value,
            status: FactMappingValueStatus::NotEvaluated,
            error_value: None,
        }
    }

    pub fn reset_status(&mut self) {
        self.status = FactMappingValueStatus::NotEvaluated;
        self.error_value = None;
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CellLayoutError {
    #[error("No cell for column {0}")]
    MissingCell(usize),
    #[error("More than one cell for column {0}")]
    DuplicateCell(usize),
    #[error("Cell refers to undeclared column {0}")]
    UndeclaredColumn(usize),
}

/// One test case: a row of given and expected cells.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scenario {
    pub description: String,
    #[serde(default)]
    pub fact_mapping_values: Vec<FactMappingValue>,
}

impl Scenario {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            fact_mapping_values: Vec::new(),
        }
    }

    pub fn with_cell(mut self, column_index: usize, value: CellValue) -> Self {
        self.fact_mapping_values
            .push(FactMappingValue::new(column_index, value));
        self
    }

    pub fn cell(&self, column_index: usize) -> Option<&FactMappingValue> {
        self.fact_mapping_values
            .iter()
            .find(|cell| cell.column_index == column_index)
    }

    pub fn cell_mut(&mut self, column_index: usize) -> Option<&mut FactMappingValue> {
        self.fact_mapping_values
            .iter_mut()
            .find(|cell| cell.column_index == column_index)
    }

    /// Checks that the row has exactly one cell per declared column. Every
    /// problem is reported, not only the first.
    pub fn check_layout(&self, descriptor: &SimulationDescriptor) -> Vec<CellLayoutError> {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        let mut errors = Vec::new();
        for cell in &self.fact_mapping_values {
            *counts.entry(cell.column_index).or_default() += 1;
            if descriptor.get(cell.column_index).is_none() {
                errors.push(CellLayoutError::UndeclaredColumn(cell.column_index));
            }
        }
        for mapping in &descriptor.fact_mappings {
            match counts.get(&mapping.index).copied().unwrap_or(0) {
                0 if mapping.role() != FactMappingType::Other => {
                    errors.push(CellLayoutError::MissingCell(mapping.index))
                }
                0 | 1 => {}
                _ => errors.push(CellLayoutError::DuplicateCell(mapping.index)),
            }
        }
        errors
    }

    pub fn reset_statuses(&mut self) {
        self.fact_mapping_values
            .iter_mut()
            .for_each(FactMappingValue::reset_status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::descriptor::{FactIdentifier, FactMapping};

    #[test]
    fn test_cell_value_json_distinguishes_null_and_absent() {
        let null: CellValue =
            serde_json::from_value(serde_json::json!({"kind": "raw", "value": null})).unwrap();
        assert_eq!(null, CellValue::Raw(serde_json::Value::Null));
        assert!(null.is_expressed());

        let absent: CellValue =
            serde_json::from_value(serde_json::json!({"kind": "not_expressed"})).unwrap();
        assert_eq!(absent, CellValue::NotExpressed);
        assert!(!absent.is_expressed());
    }

    #[test]
    fn test_check_layout() {
        let person = FactIdentifier::of_type("Person");
        let descriptor = SimulationDescriptor::new()
            .with_mapping(FactMapping::new(0, person.clone(), FactMappingType::Given, "age"))
            .with_mapping(FactMapping::new(1, person, FactMappingType::Expected, "isAdult"));

        let complete = Scenario::new("ok")
            .with_cell(0, CellValue::expression("30"))
            .with_cell(1, CellValue::expression("true"));
        assert!(complete.check_layout(&descriptor).is_empty());

        let broken = Scenario::new("broken")
            .with_cell(0, CellValue::expression("30"))
            .with_cell(0, CellValue::expression("31"))
            .with_cell(7, CellValue::expression("x"));
        let errors = broken.check_layout(&descriptor);
        assert!(errors.contains(&CellLayoutError::DuplicateCell(0)));
        assert!(errors.contains(&CellLayoutError::MissingCell(1)));
        assert!(errors.contains(&CellLayoutError::UndeclaredColumn(7)));
    }
}
