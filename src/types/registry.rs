use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::eval::value::Value;

/// Scalar or composite shape a field value is parsed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    String,
    List,
    Object,
    Any,
}

impl ValueType {
    /// Converts an already structured value into this type. Returns `None`
    /// when the value cannot represent the type. Null is accepted everywhere.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (ValueType::Any, value) => Some(value),
            (ValueType::Boolean, v @ Value::Boolean(_)) => Some(v),
            (ValueType::Integer, v @ Value::Integer(_)) => Some(v),
            (ValueType::Integer, Value::Float(f))
                if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&f) =>
            {
                Some(Value::Integer(f as i64))
            }
            (ValueType::Float, v @ Value::Float(_)) => Some(v),
            (ValueType::Float, Value::Integer(i)) => Some(Value::Float(i as f64)),
            (ValueType::String, v @ Value::String(_)) => Some(v),
            (ValueType::List, v @ Value::List(_)) => Some(v),
            (ValueType::Object, v @ Value::Map(_)) => Some(v),
            _ => None,
        }
    }
}

/// Declared type of a fact field: either a value or another fact type that
/// can be navigated further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    Value(ValueType),
    Nested { fact: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSchema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
}

impl FactSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value_field(mut self, name: &str, value_type: ValueType) -> Self {
        self.fields
            .insert(name.to_string(), FieldType::Value(value_type));
        self
    }

    pub fn with_nested_field(mut self, name: &str, fact_type: &str) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldType::Nested {
                fact: fact_type.to_string(),
            },
        );
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }
}

/// Fact types known to a rule container, keyed by type name.
///
/// Shared read-only by every scenario of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeRegistry {
    schemas: BTreeMap<String, FactSchema>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fact_type: &str, schema: FactSchema) -> Option<FactSchema> {
        self.schemas.insert(fact_type.to_string(), schema)
    }

    pub fn with_type(mut self, fact_type: &str, schema: FactSchema) -> Self {
        self.register(fact_type, schema);
        self
    }

    pub fn schema(&self, fact_type: &str) -> Option<&FactSchema> {
        self.schemas.get(fact_type)
    }

    pub fn fact_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
