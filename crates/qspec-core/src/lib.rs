//! # qspec-core
//!
//! Core types, traits, and utilities for qspec.
//!
//! This crate provides the foundational building blocks used across all other crates:
//! - Common error types
//! - Result type aliases
//! - Entity metadata (schemas, field descriptors, dynamic values)
//! - Pagination types
//! - Configuration types

pub mod error;
pub mod result;
pub mod traits;
pub mod types;
pub mod pagination;
pub mod config;

pub use error::*;
pub use result::*;
pub use traits::*;
pub use types::*;
pub use pagination::*;
pub use config::{ConfigError, ParseFailurePolicy, QueryConfig};
