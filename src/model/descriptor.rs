use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("Duplicate column index {0}")]
    DuplicateIndex(usize),
    #[error("Column {index} has an empty fact type")]
    EmptyFactType { index: usize },
}

/// Role of a column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum FactMappingType {
    Given,
    Expected,
    /// Bookkeeping columns (row number, description); never evaluated.
    Other,
}

/// Identity of a fact within a scenario. `name` distinguishes two facts of
/// the same `class_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactIdentifier {
    pub name: String,
    pub class_name: String,
}

impl FactIdentifier {
    pub fn new(name: &str, class_name: &str) -> Self {
        Self {
            name: name.to_string(),
            class_name: class_name.to_string(),
        }
    }

    /// Identifier whose alias is the type name itself.
    pub fn of_type(class_name: &str) -> Self {
        Self::new(class_name, class_name)
    }
}

impl std::fmt::Display for FactIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name == self.class_name {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.class_name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpressionIdentifier {
    pub name: String,
    pub role: FactMappingType,
}

impl ExpressionIdentifier {
    pub fn new(name: &str, role: FactMappingType) -> Self {
        Self {
            name: name.to_string(),
            role,
        }
    }
}

/// Column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactMapping {
    pub index: usize,
    pub fact_identifier: FactIdentifier,
    pub expression_identifier: ExpressionIdentifier,
    #[serde(default, with = "dotted_path")]
    pub field_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FactMapping {
    pub fn new(
        index: usize,
        fact_identifier: FactIdentifier,
        role: FactMappingType,
        field_path: &str,
    ) -> Self {
        let expression_name = format!("{}_{}", role, index);
        Self {
            index,
            fact_identifier,
            expression_identifier: ExpressionIdentifier::new(&expression_name, role),
            field_path: dotted_path::split(field_path),
            label: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn role(&self) -> FactMappingType {
        self.expression_identifier.role
    }

    /// Human readable column name: the explicit label, or `alias.path`.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None if self.field_path.is_empty() => self.fact_identifier.name.clone(),
            None => format!(
                "{}.{}",
                self.fact_identifier.name,
                self.field_path.join(".")
            ),
        }
    }
}

/// Ordered column schema shared by every scenario of a simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationDescriptor {
    #[serde(default)]
    pub fact_mappings: Vec<FactMapping>,
}

impl SimulationDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, mapping: FactMapping) -> Self {
        self.fact_mappings.push(mapping);
        self
    }

    pub fn add_fact_mapping(&mut self, mapping: FactMapping) -> Result<(), DescriptorError> {
        if self.get(mapping.index).is_some() {
            return Err(DescriptorError::DuplicateIndex(mapping.index));
        }
        self.fact_mappings.push(mapping);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&FactMapping> {
        self.fact_mappings.iter().find(|m| m.index == index)
    }

    pub fn len(&self) -> usize {
        self.fact_mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fact_mappings.is_empty()
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let mut seen = HashSet::new();
        for mapping in &self.fact_mappings {
            if !seen.insert(mapping.index) {
                return Err(DescriptorError::DuplicateIndex(mapping.index));
            }
            if mapping.role() != FactMappingType::Other
                && mapping.fact_identifier.class_name.is_empty()
            {
                return Err(DescriptorError::EmptyFactType {
                    index: mapping.index,
                });
            }
        }
        Ok(())
    }
}

/// Field paths are written `a.b.c` in documents.
pub(crate) mod dotted_path {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn split(path: &str) -> Vec<String> {
        path.split('.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn serialize<S: Serializer>(path: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&path.join("."))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let path = String::deserialize(deserializer)?;
        Ok(split(&path))
    }
}
