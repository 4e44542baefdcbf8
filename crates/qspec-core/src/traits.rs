//! Core traits implemented by queryable entities

use crate::types::{EntitySchema, Value};

/// Base trait for every entity a specification can target.
///
/// `schema` is the whitelist used for field and relation resolution;
/// `value` reads a field by its canonical dotted path as produced by
/// [`EntitySchema::resolve_path`]. Implementations return [`Value::Null`]
/// for absent optional values, for paths that cross an absent nested object,
/// and for paths they do not know.
pub trait Entity: Clone + Send + Sync + 'static {
    fn schema() -> &'static EntitySchema;

    fn value(&self, path: &str) -> Value;

    /// Human-readable type name for diagnostics
    fn type_name() -> &'static str {
        Self::schema().name
    }

    /// Values of every top-level scalar field, used for distinct comparisons
    fn scalar_values(&self) -> Vec<Value> {
        Self::schema()
            .fields
            .iter()
            .filter(|f| !matches!(f.field_type, crate::types::FieldType::Object(_)))
            .map(|f| self.value(f.name))
            .collect()
    }
}
