//! Queryable Sources
//!
//! The only interface the query-plan compiler depends on. A persistence
//! layer implements [`Queryable`] for its query type; each method consumes
//! the query and returns the refined one.

use qspec_core::{Entity, QueryResult};

use crate::includes::IncludeOp;
use crate::predicate::Predicate;
use crate::sorts::SortCriterion;
use crate::specification::TrackingMode;

/// A composable, not yet executed query over entities of type `T`
pub trait Queryable<T: Entity>: Sized {
    fn with_tracking(self, mode: TrackingMode) -> Self;

    /// Bypass filters the store applies to every query
    fn ignore_store_filters(self) -> Self;

    fn tag_with(self, tag: &str) -> Self;

    /// Fetch collection includes with separate round trips
    fn split_fetch(self) -> Self;

    fn filter(self, predicate: &Predicate<T>) -> Self;

    /// Attach related data described by a resolved include operation
    fn include(self, op: &IncludeOp) -> QueryResult<Self>;

    /// Attach related data by dotted navigation path
    fn include_path(self, path: &str) -> QueryResult<Self>;

    fn group_by(self, key: &str) -> Self;

    fn distinct(self) -> Self;

    /// Replace any ordering with `criterion` as the primary key
    fn order_by(self, criterion: &SortCriterion) -> Self;

    /// Add a secondary key; ties of the previous keys are broken by it
    fn then_by(self, criterion: &SortCriterion) -> Self;

    fn skip(self, count: usize) -> Self;

    fn take(self, count: usize) -> Self;
}
