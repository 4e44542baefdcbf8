//! Result type aliases

use crate::error::{QueryError, StoreError};

/// Standard Result type for compilation and execution
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type for store materialization
pub type StoreResult<T> = Result<T, StoreError>;
