//! Rule session contract.
//!
//! The runner depends only on a narrow surface of the rule engine: insert
//! facts, fire all rules to a fixpoint, and read facts back. A
//! [`SessionProvider`] hands out sessions and exposes the fact types the
//! underlying container knows about.
//!
//! [`in_memory`] contains a small reference engine used by the tests and
//! the `scesim` binary.

pub mod in_memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eval::value::Value;
use crate::types::TypeRegistry;

pub use in_memory::{InMemorySession, InMemorySessionProvider, Rule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactHandle(pub u64);

impl std::fmt::Display for FactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A domain object in working memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub fact_type: String,
    pub value: Value,
}

impl Fact {
    pub fn new(fact_type: &str, value: Value) -> Self {
        Self {
            fact_type: fact_type.to_string(),
            value,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match &self.value {
            Value::Map(map) => map.get(name),
            _ => None,
        }
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        if !matches!(self.value, Value::Map(_)) {
            self.value = Value::object();
        }
        if let Value::Map(map) = &mut self.value {
            map.insert(name.to_string(), value);
        }
    }
}

/// A fact together with the handle it was inserted under. Handles grow with
/// insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct FactEntry {
    pub handle: FactHandle,
    pub fact: Fact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectFilter {
    All,
    ByType(String),
}

impl ObjectFilter {
    pub fn by_type(fact_type: &str) -> Self {
        ObjectFilter::ByType(fact_type.to_string())
    }

    pub fn accepts(&self, fact: &Fact) -> bool {
        match self {
            ObjectFilter::All => true,
            ObjectFilter::ByType(fact_type) => &fact.fact_type == fact_type,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Rule session unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to insert {fact_type}: {message}")]
    InsertFailed { fact_type: String, message: String },
    #[error("Rule evaluation failed: {0}")]
    EvaluationFailed(String),
    #[error("Rule evaluation did not reach a fixpoint within {limit} firings")]
    FixpointNotReached { limit: usize },
    #[error("Session already disposed")]
    Disposed,
}

pub type SessionResult<T> = Result<T, SessionError>;

#[mockall::automock]
#[async_trait]
pub trait RuleSession: Send {
    async fn insert(&mut self, fact: Fact) -> SessionResult<FactHandle>;

    /// Runs rules until none is eligible. Returns the number of firings.
    async fn fire_all_rules(&mut self) -> SessionResult<usize>;

    /// Facts accepted by `filter`, in insertion order.
    async fn get_objects(&self, filter: &ObjectFilter) -> SessionResult<Vec<FactEntry>>;

    async fn dispose(&mut self) -> SessionResult<()>;

    /// Bounds the firings of one `fire_all_rules` call. Sessions without a
    /// bound ignore it.
    fn set_max_firings(&mut self, _max_firings: usize) {}
}

#[mockall::automock]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> SessionResult<Box<dyn RuleSession>>;

    fn type_registry(&self) -> Arc<TypeRegistry>;
}
