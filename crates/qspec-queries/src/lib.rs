//! # qspec-queries
//!
//! Specification-to-query compilation for qspec.
//!
//! This crate turns declarative query descriptions into ordered operations
//! against a queryable source.
//!
//! ## Structure
//!
//! - `filters` - The flat filter model received from API callers
//! - `sorts` - Sort directions and criteria
//! - `predicate` - Serializable predicate trees
//! - `filter_compiler` - Filter model to predicate compilation
//! - `includes` - Eager-load links and chain resolution
//! - `composition` - AND/OR/NOT over predicate specifications
//! - `specification` - The full query specification
//! - `builder` - Fluent API for constructing specifications
//! - `queryable` - The source interface plans are applied to
//! - `evaluator` - Specification to query-plan compilation
//!
//! ## Example
//!
//! ```
//! use qspec_core::{Entity, EntitySchema, FieldDescriptor, FieldType, Value};
//! use qspec_queries::filters::{FilterGroup, FilterItem, FilterModel};
//! use qspec_queries::filter_compiler::compile_filter;
//!
//! static PRODUCT: EntitySchema = EntitySchema {
//!     name: "Product",
//!     fields: &[
//!         FieldDescriptor::required("Price", FieldType::Float),
//!         FieldDescriptor::required("Featured", FieldType::Boolean),
//!         FieldDescriptor::required("Rating", FieldType::Float),
//!     ],
//!     relations: &[],
//! };
//!
//! #[derive(Clone)]
//! struct Product {
//!     price: f64,
//!     featured: bool,
//!     rating: f64,
//! }
//!
//! impl Entity for Product {
//!     fn schema() -> &'static EntitySchema {
//!         &PRODUCT
//!     }
//!
//!     fn value(&self, path: &str) -> Value {
//!         match path {
//!             "Price" => self.price.into(),
//!             "Featured" => self.featured.into(),
//!             "Rating" => self.rating.into(),
//!             _ => Value::Null,
//!         }
//!     }
//! }
//!
//! let model = FilterModel::new()
//!     .with(FilterItem::raw("Price", "gte", Some("100".into())))
//!     .group(FilterGroup::or(vec![
//!         FilterItem::equals("Featured", "true"),
//!         FilterItem::raw("Rating", "gt", Some("4.5".into())),
//!     ]));
//!
//! let predicate = compile_filter::<Product>(&model).unwrap();
//! assert_eq!(
//!     predicate.to_string(),
//!     "Price >= 100 AND (Featured == true OR Rating > 4.5)"
//! );
//! assert!(predicate.evaluate(&Product { price: 120.0, featured: false, rating: 4.8 }));
//! ```

pub mod filters;
pub mod sorts;
pub mod predicate;
pub mod filter_compiler;
pub mod includes;
pub mod composition;
pub mod specification;
pub mod builder;
pub mod queryable;
pub mod evaluator;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports for convenience
pub use filters::{FilterGroup, FilterItem, FilterLogic, FilterModel, FilterOperator};
pub use sorts::{SortCriterion, SortDirection, SortItem};
pub use predicate::{field, CompareOp, Expr, FieldRef, Predicate, TextOp};
pub use filter_compiler::{compile_filter, FilterCompiler};
pub use includes::{ChainBuilder, ChainShape, IncludeNode, IncludeOp, Relation};
pub use composition::{AndSpec, ExprSpec, NotSpec, OrSpec, PredicateSpec, PredicateSpecExt};
pub use specification::{Paging, SearchClause, Selector, Specification, TrackingMode};
pub use builder::SpecificationBuilder;
pub use queryable::Queryable;
pub use evaluator::{QueryOp, QueryPlan, SpecificationEvaluator};
