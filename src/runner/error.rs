use thiserror::Error;

use crate::eval::{EvaluationError, FieldAccessError};
use crate::model::{CellLayoutError, DescriptorError, FactIdentifier};
use crate::session::SessionError;
use crate::types::FieldResolutionError;

use super::aggregator::AssertionFailure;

/// A single cell whose value could not be produced. Sibling cells are still
/// extracted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueExtractionError {
    #[error("Column {column} ({label}): {source}")]
    Resolution {
        column: usize,
        label: String,
        #[source]
        source: FieldResolutionError,
    },
    #[error("Column {column} ({label}): {source}")]
    Evaluation {
        column: usize,
        label: String,
        #[source]
        source: EvaluationError,
    },
    #[error("Column {column} ({label}): cannot assign value: {source}")]
    Assignment {
        column: usize,
        label: String,
        #[source]
        source: FieldAccessError,
    },
    #[error("Column {column} ({label}): an error marker is only meaningful on EXPECTED columns")]
    ErrorMarkerOnGiven { column: usize, label: String },
    #[error("{0}")]
    Layout(#[from] CellLayoutError),
}

impl ValueExtractionError {
    pub fn column(&self) -> Option<usize> {
        match self {
            Self::Resolution { column, .. }
            | Self::Evaluation { column, .. }
            | Self::Assignment { column, .. }
            | Self::ErrorMarkerOnGiven { column, .. } => Some(*column),
            Self::Layout(CellLayoutError::MissingCell(column))
            | Self::Layout(CellLayoutError::DuplicateCell(column))
            | Self::Layout(CellLayoutError::UndeclaredColumn(column)) => Some(*column),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioExecutionError {
    #[error("Failed to insert {fact}: {source}")]
    Insert {
        fact: FactIdentifier,
        #[source]
        source: SessionError,
    },
    #[error("Failed to fire rules: {0}")]
    FireAllRules(#[source] SessionError),
}

/// Failures that are not about a single expectation and abort verification.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationError {
    #[error("Failed to read {fact_type} facts from the session: {source}")]
    SessionRead {
        fact_type: String,
        #[source]
        source: SessionError,
    },
}

/// Domain failures of one scenario, reported through the notifier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("{}", format_extraction(.0))]
    Extraction(Vec<ValueExtractionError>),
    #[error(transparent)]
    Execution(#[from] ScenarioExecutionError),
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error("Unexpected test error in scenario '{description}': {message}")]
    UnexpectedInternal { description: String, message: String },
}

impl ScenarioError {
    pub fn unexpected(description: &str, message: impl std::fmt::Display) -> Self {
        Self::UnexpectedInternal {
            description: description.to_string(),
            message: message.to_string(),
        }
    }
}

fn format_extraction(errors: &[ValueExtractionError]) -> String {
    let mut message = format!("Value extraction failed for {} cell(s)", errors.len());
    for error in errors {
        message.push_str("\n  - ");
        message.push_str(&error.to_string());
    }
    message
}

/// Errors that stop the whole run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("Cannot obtain a rule session: {0}")]
    SessionUnavailable(#[source] SessionError),
    #[error("Invalid simulation descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),
}

pub type RunResult<T> = Result<T, RunError>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
