use thiserror::Error;

use super::registry::{FieldType, TypeRegistry, ValueType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldResolutionError {
    #[error("Unknown fact type: {0}")]
    UnknownFactType(String),
    #[error("Field '{field}' does not exist on {fact_type} (while resolving {path})")]
    UnknownField {
        fact_type: String,
        field: String,
        path: String,
    },
    #[error("Cannot navigate into '{path}': {value_type} has no fields")]
    NotNavigable { path: String, value_type: ValueType },
}

pub type ResolutionResult<T> = Result<T, FieldResolutionError>;

/// A column's fact type and field path checked against the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub fact_type: String,
    pub segments: Vec<String>,
    /// `Type.seg1.seg2`, used to identify the field in diagnostics.
    pub logical_path: String,
    pub value_type: ValueType,
}

impl ResolvedField {
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Resolves `segments` one at a time starting at `fact_type`. Each segment
/// narrows the current schema and extends the logical path.
pub fn resolve_field(
    registry: &TypeRegistry,
    fact_type: &str,
    segments: &[String],
) -> ResolutionResult<ResolvedField> {
    let mut schema = registry
        .schema(fact_type)
        .ok_or_else(|| FieldResolutionError::UnknownFactType(fact_type.to_string()))?;
    let mut current_type = fact_type.to_string();
    let mut logical_path = fact_type.to_string();
    let mut value_type = ValueType::Object;

    for (depth, segment) in segments.iter().enumerate() {
        logical_path.push('.');
        logical_path.push_str(segment);

        let field = schema
            .field(segment)
            .ok_or_else(|| FieldResolutionError::UnknownField {
                fact_type: current_type.clone(),
                field: segment.clone(),
                path: logical_path.clone(),
            })?;

        let is_last = depth + 1 == segments.len();
        match field {
            FieldType::Nested { fact } => {
                schema = registry
                    .schema(fact)
                    .ok_or_else(|| FieldResolutionError::UnknownFactType(fact.clone()))?;
                current_type = fact.clone();
                value_type = ValueType::Object;
            }
            FieldType::Value(leaf) if is_last => {
                value_type = *leaf;
            }
            FieldType::Value(leaf) => {
                return Err(FieldResolutionError::NotNavigable {
                    path: logical_path,
                    value_type: *leaf,
                });
            }
        }
    }

    Ok(ResolvedField {
        fact_type: fact_type.to_string(),
        segments: segments.to_vec(),
        logical_path,
        value_type,
    })
}
