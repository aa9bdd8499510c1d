use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dynamic value carried by facts, given inputs and expectations.
///
/// Maps are ordered so that rendering (and therefore mismatch reports) is
/// stable between runs.
#[derive(Clone, Debug, PartialEq, Default, Deserialize, Serialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A field whose computation failed inside the rule session. Reading it
    /// raises an evaluation error.
    Error(String),
    #[default]
    Null,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldAccessError {
    #[error("Field '{path}' is not an object")]
    NotAnObject { path: String },
    #[error("Field '{path}' raised an error: {message}")]
    Errored { path: String, message: String },
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Error(message) => write!(f, "<error: {}>", message),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl Value {
    pub fn object() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::List(_) => "list",
            Value::Map(_) => "object",
            Value::Error(_) => "error",
            Value::Null => "null",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Equality where integers and floats compare numerically.
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                match (self, other) {
                    (Value::Integer(a), Value::Integer(b)) => a == b,
                    _ => self.as_f64() == other.as_f64(),
                }
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structural_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, x)| b.get(key).is_some_and(|y| x.structural_eq(y)))
            }
            _ => self == other,
        }
    }

    /// Walks a field path already resolved against the fact schema. An empty
    /// path yields the value itself; an unset key or a null parent reads as
    /// `Null`. Error values and scalar parents fail.
    pub fn navigate(&self, path: &[String]) -> Result<&Value, FieldAccessError> {
        static NULL: Value = Value::Null;
        let mut current = self;
        for (depth, segment) in path.iter().enumerate() {
            current = match current {
                Value::Map(map) => match map.get(segment) {
                    Some(value) => value,
                    None => return Ok(&NULL),
                },
                Value::Null => return Ok(&NULL),
                Value::Error(message) => {
                    return Err(FieldAccessError::Errored {
                        path: path[..=depth].join("."),
                        message: message.clone(),
                    });
                }
                _ => {
                    return Err(FieldAccessError::NotAnObject {
                        path: path[..=depth].join("."),
                    })
                }
            };
        }
        if let Value::Error(message) = current {
            return Err(FieldAccessError::Errored {
                path: path.join("."),
                message: message.clone(),
            });
        }
        Ok(current)
    }

    /// Sets `value` at `path`, creating intermediate objects. A null
    /// intermediate is replaced by an empty object.
    pub fn set_path(&mut self, path: &[String], value: Value) -> Result<(), FieldAccessError> {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return Ok(());
        };
        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            if matches!(current, Value::Null) {
                *current = Value::object();
            }
            current = match current {
                Value::Map(map) => map.entry(segment.clone()).or_insert(Value::Null),
                _ => {
                    return Err(FieldAccessError::NotAnObject {
                        path: path[..depth].join("."),
                    });
                }
            };
        }
        if matches!(current, Value::Null) {
            *current = Value::object();
        }
        match current {
            Value::Map(map) => {
                map.insert(last.clone(), value);
                Ok(())
            }
            _ => Err(FieldAccessError::NotAnObject {
                path: parents.join("."),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_set_and_navigate_nested_path() {
        let mut person = Value::object();
        person
            .set_path(&path("address.city"), Value::from("Kyoto"))
            .unwrap();
        person.set_path(&path("age"), Value::Integer(30)).unwrap();

        assert_eq!(
            person.navigate(&path("address.city")).unwrap(),
            &Value::from("Kyoto")
        );
        assert_eq!(person.navigate(&path("age")).unwrap(), &Value::Integer(30));
        assert_eq!(person.navigate(&[]).unwrap(), &person);
    }

    #[test]
    fn test_navigate_reads_unset_fields_as_null() {
        let mut person = Value::object();
        person.set_path(&path("age"), Value::Integer(30)).unwrap();
        person.set_path(&path("address"), Value::Null).unwrap();
        person
            .set_path(&path("score"), Value::Error("division by zero".into()))
            .unwrap();

        assert_eq!(person.navigate(&path("name")), Ok(&Value::Null));
        assert_eq!(
            person.navigate(&path("address.city")),
            Ok(&Value::Null)
        );
        assert_eq!(
            person.navigate(&path("age")),
            Ok(&Value::Integer(30))
        );
        assert!(matches!(
            person.navigate(&path("age.years")),
            Err(FieldAccessError::NotAnObject { .. })
        ));
        assert!(matches!(
            person.navigate(&path("score")),
            Err(FieldAccessError::Errored { .. })
        ));
    }

    #[test]
    fn test_set_path_through_scalar_fails() {
        let mut person = Value::object();
        person.set_path(&path("age"), Value::Integer(30)).unwrap();
        let result = person.set_path(&path("age.years"), Value::Integer(1));
        assert!(matches!(result, Err(FieldAccessError::NotAnObject { .. })));
    }

    #[test]
    fn test_structural_eq_numeric() {
        assert!(Value::Integer(3).structural_eq(&Value::Float(3.0)));
        assert!(!Value::Integer(3).structural_eq(&Value::Float(3.5)));
        assert!(Value::List(vec![Value::Integer(1)]).structural_eq(&Value::List(vec![Value::Float(1.0)])));
        assert!(!Value::from("1").structural_eq(&Value::Integer(1)));
    }

    #[test]
    fn test_from_json_and_display() {
        let value = Value::from(serde_json::json!({"b": [1, 2.5], "a": null, "c": true}));
        assert_eq!(value.to_string(), "{a: null, b: [1, 2.5], c: true}");
    }
}
