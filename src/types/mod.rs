//! Fact type resolution.
//!
//! Columns of a simulation name their fact type and field path as plain
//! strings. The [`registry::TypeRegistry`] describes which fact types a rule
//! container knows about, and [`resolver::resolve_field`] turns a column's
//! declaration into a [`resolver::ResolvedField`] once per run, so that
//! extraction and verification only deal with typed paths.

pub mod registry;
pub mod resolver;

pub use registry::{FactSchema, FieldType, TypeRegistry, ValueType};
pub use resolver::{resolve_field, FieldResolutionError, ResolvedField};
