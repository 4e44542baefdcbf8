//! Store-facing traits
//!
//! A [`QuerySource`] hands out fresh queries; a query is refined through
//! [`Queryable`] and finally executed through one of the [`Materialize`]
//! terminal operations. Materialization is the only place that suspends.

use async_trait::async_trait;
use qspec_core::{Entity, StoreResult};
use qspec_queries::Queryable;
use tokio_util::sync::CancellationToken;

/// Terminal operations of a query
#[async_trait]
pub trait Materialize<T: Entity>: Send + Sized {
    /// Every matching row, in query order
    async fn to_list(self, cancel: &CancellationToken) -> StoreResult<Vec<T>>;

    /// The first matching row
    async fn first(self, cancel: &CancellationToken) -> StoreResult<Option<T>>;

    async fn count(self, cancel: &CancellationToken) -> StoreResult<usize>;

    async fn any(self, cancel: &CancellationToken) -> StoreResult<bool>;
}

/// A store that can start new queries over `T`
#[async_trait]
pub trait QuerySource<T: Entity>: Send + Sync {
    type Query: Queryable<T> + Materialize<T>;

    async fn query(&self) -> Self::Query;
}
