use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::data::{ExpectedCheck, ScenarioExpect, ScenarioGiven};
use super::error::ValueExtractionError;
use crate::eval::{EvaluationContext, EvaluationError, ExpectedValue, ExpressionEvaluator, Value};
use crate::model::{CellValue, FactIdentifier, FactMapping, FactMappingType, FactMappingValue, SimulationDescriptor};
use crate::types::{resolve_field, FieldResolutionError, ResolvedField, TypeRegistry};

/// A column with its field path resolved against the type registry.
#[derive(Debug, Clone)]
pub struct ResolvedColumn {
    pub mapping: FactMapping,
    pub field: Result<ResolvedField, FieldResolutionError>,
}

impl ResolvedColumn {
    fn label(&self) -> String {
        self.mapping.display_label()
    }
}

/// The descriptor resolved once per run. Resolution failures are kept per
/// column and surface only for the cells of that column.
#[derive(Debug, Clone)]
pub struct ResolvedDescriptor {
    columns: BTreeMap<usize, ResolvedColumn>,
}

impl ResolvedDescriptor {
    pub fn resolve(descriptor: &SimulationDescriptor, registry: &TypeRegistry) -> Self {
        let columns = descriptor
            .fact_mappings
            .iter()
            .map(|mapping| {
                let field = resolve_field(
                    registry,
                    &mapping.fact_identifier.class_name,
                    &mapping.field_path,
                );
                if let Err(e) = &field {
                    warn!("column {} cannot be resolved: {}", mapping.index, e);
                }
                (
                    mapping.index,
                    ResolvedColumn {
                        mapping: mapping.clone(),
                        field,
                    },
                )
            })
            .collect();
        Self { columns }
    }

    pub fn column(&self, index: usize) -> Option<&ResolvedColumn> {
        self.columns.get(&index)
    }

    /// Cells of `role` columns, paired with their column, in cell order.
    fn cells_with_role<'a>(
        &'a self,
        cells: &'a [FactMappingValue],
        role: FactMappingType,
    ) -> impl Iterator<Item = (&'a ResolvedColumn, &'a FactMappingValue)> + 'a {
        cells.iter().filter_map(move |cell| {
            self.columns
                .get(&cell.column_index)
                .filter(|column| column.mapping.role() == role)
                .map(|column| (column, cell))
        })
    }
}

/// Values produced by extraction plus the errors of the cells that failed.
#[derive(Debug)]
pub struct Extraction<T> {
    pub values: Vec<T>,
    pub errors: Vec<ValueExtractionError>,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            errors: Vec::new(),
        }
    }
}

fn resolved_field<'a>(column: &'a ResolvedColumn) -> Result<&'a ResolvedField, ValueExtractionError> {
    column
        .field
        .as_ref()
        .map_err(|e| ValueExtractionError::Resolution {
            column: column.mapping.index,
            label: column.label(),
            source: e.clone(),
        })
}

fn evaluation_error(column: &ResolvedColumn, source: EvaluationError) -> ValueExtractionError {
    ValueExtractionError::Evaluation {
        column: column.mapping.index,
        label: column.label(),
        source,
    }
}

fn structured_value(
    column: &ResolvedColumn,
    field: &ResolvedField,
    json: &serde_json::Value,
) -> Result<Value, ValueExtractionError> {
    let value = Value::from(json.clone());
    let found = value.type_name().to_string();
    field.value_type.coerce(value).ok_or_else(|| {
        evaluation_error(
            column,
            EvaluationError::TypeMismatch {
                path: field.logical_path.clone(),
                expected: field.value_type,
                found,
            },
        )
    })
}

fn given_value(
    column: &ResolvedColumn,
    cell: &FactMappingValue,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<Option<(ResolvedField, Value)>, ValueExtractionError> {
    if !cell.value.is_expressed() {
        return Ok(None);
    }
    let field = resolved_field(column)?;
    let value = match &cell.value {
        CellValue::NotExpressed => return Ok(None),
        CellValue::ExpectError => {
            return Err(ValueExtractionError::ErrorMarkerOnGiven {
                column: column.mapping.index,
                label: column.label(),
            });
        }
        CellValue::Raw(serde_json::Value::String(expression)) => {
            let context = EvaluationContext::new(&field.fact_type, &field.logical_path);
            evaluator
                .evaluate(expression, &field.value_type, &context)
                .map_err(|e| evaluation_error(column, e))?
        }
        CellValue::Raw(json) => structured_value(column, field, json)?,
    };
    Ok(Some((field.clone(), value)))
}

/// Builds one fact per fact identifier from the GIVEN cells. Identifiers
/// appear in the order of their first cell; identifiers without any
/// expressed cell produce no fact.
#[tracing::instrument(skip_all)]
pub fn extract_given_values(
    descriptor: &ResolvedDescriptor,
    cells: &[FactMappingValue],
    evaluator: &dyn ExpressionEvaluator,
) -> Extraction<ScenarioGiven> {
    let mut extraction = Extraction::default();
    let mut facts: Vec<(FactIdentifier, Option<Value>)> = Vec::new();

    for (column, cell) in descriptor.cells_with_role(cells, FactMappingType::Given) {
        let identifier = &column.mapping.fact_identifier;
        let position = match facts.iter().position(|(id, _)| id == identifier) {
            Some(position) => position,
            None => {
                facts.push((identifier.clone(), None));
                facts.len() - 1
            }
        };

        match given_value(column, cell, evaluator) {
            Ok(None) => {}
            Ok(Some((field, value))) => {
                let fact = facts[position].1.get_or_insert_with(Value::object);
                if let Err(source) = fact.set_path(&field.segments, value) {
                    extraction.errors.push(ValueExtractionError::Assignment {
                        column: column.mapping.index,
                        label: column.label(),
                        source,
                    });
                }
            }
            Err(e) => {
                debug!("given cell {} failed: {}", cell.column_index, e);
                extraction.errors.push(e);
            }
        }
    }

    extraction.values = facts
        .into_iter()
        .filter_map(|(fact_identifier, value)| {
            value.map(|value| ScenarioGiven {
                fact_identifier,
                value,
            })
        })
        .collect();
    extraction
}

fn expected_check(
    column: &ResolvedColumn,
    cell: &FactMappingValue,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<Option<ExpectedCheck>, ValueExtractionError> {
    if !cell.value.is_expressed() {
        return Ok(None);
    }
    let field = resolved_field(column)?;
    let expected = match &cell.value {
        CellValue::NotExpressed => ExpectedValue::Absent,
        CellValue::ExpectError => ExpectedValue::ExpectError,
        CellValue::Raw(serde_json::Value::String(expression)) => {
            let context = EvaluationContext::new(&field.fact_type, &field.logical_path);
            evaluator.classify(expression, &field.value_type, &context)
        }
        CellValue::Raw(json) => ExpectedValue::Literal(structured_value(column, field, json)?),
    };
    if expected.is_absent() {
        return Ok(None);
    }
    Ok(Some(ExpectedCheck {
        cell: cell.clone(),
        label: column.label(),
        field: field.clone(),
        expected,
    }))
}

/// Groups the EXPECTED cells per fact identifier. Cells that are not
/// expressed are skipped.
#[tracing::instrument(skip_all)]
pub fn extract_expected_values(
    descriptor: &ResolvedDescriptor,
    cells: &[FactMappingValue],
    evaluator: &dyn ExpressionEvaluator,
) -> Extraction<ScenarioExpect> {
    let mut extraction: Extraction<ScenarioExpect> = Extraction::default();

    for (column, cell) in descriptor.cells_with_role(cells, FactMappingType::Expected) {
        match expected_check(column, cell, evaluator) {
            Ok(None) => {}
            Ok(Some(check)) => {
                let identifier = &column.mapping.fact_identifier;
                match extraction
                    .values
                    .iter_mut()
                    .find(|expect| &expect.fact_identifier == identifier)
                {
                    Some(expect) => expect.checks.push(check),
                    None => extraction.values.push(ScenarioExpect {
                        fact_identifier: identifier.clone(),
                        checks: vec![check],
                    }),
                }
            }
            Err(e) => {
                debug!("expected cell {} failed: {}", cell.column_index, e);
                extraction.errors.push(e);
            }
        }
    }
    extraction
}
