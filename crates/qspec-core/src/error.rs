//! Core error types for qspec
//!
//! Input-data faults never show up here: they degrade to a non-matching
//! predicate. Everything below is either a programmer mistake, a chain that
//! cannot be resolved, or a fault raised by the underlying store.

use std::collections::HashMap;
use thiserror::Error;

/// Core error type for all compilation and execution operations
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unknown filter operator: {operator}")]
    UnknownOperator { operator: String },

    #[error("Invalid specification: {0}")]
    InvalidSpecification(#[from] ValidationErrors),

    #[error("Paging requested on a specification without paging enabled")]
    PagingNotEnabled,

    #[error("Projection type mismatch: specification projects to {expected}, requested {requested}")]
    ProjectionMismatch {
        expected: &'static str,
        requested: &'static str,
    },

    #[error("Specification has no projection")]
    MissingProjection,

    #[error("Include chain error: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueryError {
    pub fn unknown_operator(operator: impl Into<String>) -> Self {
        Self::UnknownOperator {
            operator: operator.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::UnknownOperator { .. } => "unknown_operator",
            QueryError::InvalidSpecification(_) => "invalid_specification",
            QueryError::PagingNotEnabled => "paging_not_enabled",
            QueryError::ProjectionMismatch { .. } => "projection_mismatch",
            QueryError::MissingProjection => "missing_projection",
            QueryError::Chain(_) => "include_chain",
            QueryError::Store(_) => "store_error",
            QueryError::Config(_) => "configuration_error",
        }
    }

    /// Whether the error points at a programming mistake rather than the store
    pub fn is_configuration_fault(&self) -> bool {
        !matches!(self, QueryError::Store(_))
    }
}

/// Eager-load chains that cannot be turned into an include operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Link {path} is declared on {found}, but its parent yields {expected}")]
    OwnerMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("No include shape for link {path}: {detail}")]
    UnsupportedShape { path: String, detail: String },

    #[error("Include path {path} does not resolve on {entity}")]
    UnresolvedPath { path: String, entity: String },
}

/// Faults raised by a queryable store during materialization
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Validation errors collection
#[derive(Error, Debug, Default, Clone, PartialEq, Eq)]
#[error("Validation errors: {}", messages(.errors, .base_errors).join(", "))]
pub struct ValidationErrors {
    /// Field-specific errors: field_name -> Vec<error_messages>
    pub errors: HashMap<String, Vec<String>>,
    /// Base errors not tied to a specific field
    pub base_errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn add_base(&mut self, message: impl Into<String>) {
        self.base_errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.base_errors.is_empty()
    }

    /// Check if there are errors for a specific field
    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Get errors for a specific field
    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.errors.get(field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
        self.base_errors.extend(other.base_errors);
    }

    pub fn full_messages(&self) -> Vec<String> {
        messages(&self.errors, &self.base_errors)
    }

    /// Turn the collection into a result, failing when anything was recorded
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Base messages first, then field messages sorted by field name
fn messages(errors: &HashMap<String, Vec<String>>, base_errors: &[String]) -> Vec<String> {
    let mut messages = base_errors.to_vec();
    let mut fields: Vec<_> = errors.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    for (field, field_messages) in fields {
        for msg in field_messages {
            messages.push(format!("{} {}", field, msg));
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_collect() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.add("page_size", "must be greater than zero");
        errors.add_base("specification is empty");

        assert!(errors.has_error("page_size"));
        assert_eq!(errors.full_messages().len(), 2);
        assert_eq!(
            errors.to_string(),
            "Validation errors: specification is empty, page_size must be greater than zero"
        );
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: QueryError = StoreError::Backend("disk full".into()).into();
        assert_eq!(err.to_string(), "Store backend error: disk full");
        assert!(!err.is_configuration_fault());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            QueryError::unknown_operator("bogus").error_code(),
            "unknown_operator"
        );
        assert_eq!(QueryError::PagingNotEnabled.error_code(), "paging_not_enabled");
    }
}
