//! # qspec-db
//!
//! Execution layer for qspec.
//!
//! This crate runs compiled specifications against queryable stores:
//!
//! - `source` - Terminal materialization and query-source traits
//! - `memory` - An in-memory store with lazily evaluated queries
//! - `repository` - Specification repositories (`find_many`, `find_paged`, ...)
//!
//! ## Example
//!
//! ```ignore
//! use qspec_db::{MemoryStore, SpecRepository, SpecificationRepository};
//! use qspec_queries::Specification;
//! use tokio_util::sync::CancellationToken;
//!
//! let repo = SpecRepository::new(MemoryStore::with_rows(products));
//! let spec = Specification::<Product>::builder()
//!     .order_by_descending("Price")
//!     .paginate(0, 20)
//!     .build()?;
//!
//! let page = repo.find_paged(&spec, &CancellationToken::new()).await?;
//! ```

pub mod source;
pub mod memory;
pub mod repository;

// Re-exports
pub use source::{Materialize, QuerySource};
pub use memory::{MemoryQuery, MemoryStore};
pub use repository::{SpecRepository, SpecificationRepository};
