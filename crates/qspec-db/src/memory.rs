//! In-memory queryable store
//!
//! Holds entities in a `tokio` lock and answers queries from snapshots.
//! Queries are lazy: refinements are recorded and only run when a terminal
//! operation materializes them. Every applied operation is also kept as a
//! readable log for diagnostics.

use std::cmp::Ordering;

use async_trait::async_trait;
use qspec_core::{ChainError, Entity, QueryError, QueryResult, StoreError, StoreResult, Value};
use qspec_queries::{IncludeOp, Predicate, Queryable, SortCriterion, TrackingMode};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::source::{Materialize, QuerySource};

/// In-memory entity store
pub struct MemoryStore<T> {
    rows: RwLock<Vec<T>>,
    store_filter: Option<Predicate<T>>,
    fault: RwLock<Option<StoreError>>,
}

impl<T: Entity> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self {
        Self::with_rows(Vec::new())
    }

    pub fn with_rows(rows: Vec<T>) -> Self {
        Self {
            rows: RwLock::new(rows),
            store_filter: None,
            fault: RwLock::new(None),
        }
    }

    /// A filter applied to every query unless the query opts out
    pub fn with_store_filter(mut self, filter: Predicate<T>) -> Self {
        self.store_filter = Some(filter);
        self
    }

    pub async fn insert(&self, row: T) {
        self.rows.write().await.push(row);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Make every later materialization fail with `fault`
    pub async fn fail_with(&self, fault: Option<StoreError>) {
        *self.fault.write().await = fault;
    }

    /// Start a query over a snapshot of the current rows
    pub async fn snapshot(&self) -> MemoryQuery<T> {
        let rows = self.rows.read().await.clone();
        let fault = self.fault.read().await.clone();
        MemoryQuery {
            rows,
            store_filter: self.store_filter.clone(),
            fault,
            pipeline: Vec::new(),
            log: Vec::new(),
            tracking: TrackingMode::Track,
            ignore_store_filters: false,
            split_fetch: false,
            tags: Vec::new(),
            includes: Vec::new(),
        }
    }
}

#[async_trait]
impl<T: Entity> QuerySource<T> for MemoryStore<T> {
    type Query = MemoryQuery<T>;

    async fn query(&self) -> MemoryQuery<T> {
        self.snapshot().await
    }
}

enum RowOp<T> {
    Filter(Predicate<T>),
    GroupBy(String),
    Distinct,
    OrderBy(SortCriterion),
    ThenBy(SortCriterion),
    Skip(usize),
    Take(usize),
}

/// A lazy query over a snapshot of a [`MemoryStore`]
pub struct MemoryQuery<T> {
    rows: Vec<T>,
    store_filter: Option<Predicate<T>>,
    fault: Option<StoreError>,
    pipeline: Vec<RowOp<T>>,
    log: Vec<String>,
    tracking: TrackingMode,
    ignore_store_filters: bool,
    split_fetch: bool,
    tags: Vec<String>,
    includes: Vec<String>,
}

impl<T: Entity> MemoryQuery<T> {
    /// Operations applied so far, in order
    pub fn applied(&self) -> &[String] {
        &self.log
    }

    pub fn tracking(&self) -> TrackingMode {
        self.tracking
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Navigation paths attached so far
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn is_split_fetch(&self) -> bool {
        self.split_fetch
    }

    fn record(mut self, entry: String) -> Self {
        trace!(entity = T::type_name(), op = %entry, "Memory query refined");
        self.log.push(entry);
        self
    }

    fn then(mut self, op: RowOp<T>, entry: String) -> Self {
        self.pipeline.push(op);
        self.record(entry)
    }

    fn attach(mut self, path: &str) -> QueryResult<Self> {
        match T::schema().resolve_relations(path) {
            Some(_) => {
                self.includes.push(path.to_string());
                Ok(self.record(format!("include {}", path)))
            }
            None => {
                debug!(entity = T::type_name(), path, "Rejecting unresolved include");
                Err(QueryError::Chain(ChainError::UnresolvedPath {
                    path: path.to_string(),
                    entity: T::type_name().to_string(),
                }))
            }
        }
    }

    /// Run the recorded pipeline
    fn execute(self) -> StoreResult<Vec<T>> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }

        let mut rows = self.rows;
        if let (Some(filter), false) = (&self.store_filter, self.ignore_store_filters) {
            rows.retain(|row| filter.evaluate(row));
        }

        let mut keys: Vec<SortCriterion> = Vec::new();
        for op in &self.pipeline {
            match op {
                RowOp::Filter(predicate) => rows.retain(|row| predicate.evaluate(row)),
                RowOp::GroupBy(key) => group_rows(&mut rows, key),
                RowOp::Distinct => distinct_rows(&mut rows),
                RowOp::OrderBy(criterion) => {
                    keys = vec![criterion.clone()];
                    sort_rows(&mut rows, &keys);
                }
                RowOp::ThenBy(criterion) => {
                    keys.push(criterion.clone());
                    sort_rows(&mut rows, &keys);
                }
                RowOp::Skip(count) => {
                    let count = (*count).min(rows.len());
                    rows.drain(..count);
                }
                RowOp::Take(count) => rows.truncate(*count),
            }
        }
        Ok(rows)
    }

    async fn run(self, cancel: &CancellationToken) -> StoreResult<Vec<T>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StoreError::Cancelled),
            rows = async move { self.execute() } => rows,
        }
    }
}

/// Stable sort by every key in order, nulls first
fn sort_rows<T: Entity>(rows: &mut [T], keys: &[SortCriterion]) {
    rows.sort_by(|a, b| {
        keys.iter().fold(Ordering::Equal, |ord, key| {
            ord.then_with(|| {
                let cmp = a.value(&key.field).sort_cmp(&b.value(&key.field));
                if key.direction.is_ascending() {
                    cmp
                } else {
                    cmp.reverse()
                }
            })
        })
    })
}

/// Make rows with equal keys contiguous, groups in order of first appearance
fn group_rows<T: Entity>(rows: &mut [T], key: &str) {
    let mut seen: Vec<Value> = Vec::new();
    for row in rows.iter() {
        let value = row.value(key);
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    rows.sort_by_cached_key(|row| {
        let value = row.value(key);
        seen.iter().position(|v| *v == value).unwrap_or(seen.len())
    });
}

/// Drop rows whose scalar fields equal an earlier row's
fn distinct_rows<T: Entity>(rows: &mut Vec<T>) {
    let mut seen: Vec<Vec<Value>> = Vec::new();
    rows.retain(|row| {
        let values = row.scalar_values();
        if seen.contains(&values) {
            false
        } else {
            seen.push(values);
            true
        }
    });
}

impl<T: Entity> Queryable<T> for MemoryQuery<T> {
    fn with_tracking(mut self, mode: TrackingMode) -> Self {
        self.tracking = mode;
        self.record(format!("tracking {:?}", mode))
    }

    fn ignore_store_filters(mut self) -> Self {
        self.ignore_store_filters = true;
        self.record("ignore store filters".to_string())
    }

    fn tag_with(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self.record(format!("tag {}", tag))
    }

    fn split_fetch(mut self) -> Self {
        self.split_fetch = true;
        self.record("split fetch".to_string())
    }

    fn filter(self, predicate: &Predicate<T>) -> Self {
        let entry = format!("filter {}", predicate);
        self.then(RowOp::Filter(predicate.clone()), entry)
    }

    fn include(self, op: &IncludeOp) -> QueryResult<Self> {
        self.attach(&op.navigation())
    }

    fn include_path(self, path: &str) -> QueryResult<Self> {
        self.attach(path)
    }

    fn group_by(self, key: &str) -> Self {
        self.then(RowOp::GroupBy(key.to_string()), format!("group by {}", key))
    }

    fn distinct(self) -> Self {
        self.then(RowOp::Distinct, "distinct".to_string())
    }

    fn order_by(self, criterion: &SortCriterion) -> Self {
        let entry = format!("order by {} {}", criterion.field, criterion.direction.as_str());
        self.then(RowOp::OrderBy(criterion.clone()), entry)
    }

    fn then_by(self, criterion: &SortCriterion) -> Self {
        let entry = format!("then by {} {}", criterion.field, criterion.direction.as_str());
        self.then(RowOp::ThenBy(criterion.clone()), entry)
    }

    fn skip(self, count: usize) -> Self {
        self.then(RowOp::Skip(count), format!("skip {}", count))
    }

    fn take(self, count: usize) -> Self {
        self.then(RowOp::Take(count), format!("take {}", count))
    }
}

#[async_trait]
impl<T: Entity> Materialize<T> for MemoryQuery<T> {
    async fn to_list(self, cancel: &CancellationToken) -> StoreResult<Vec<T>> {
        self.run(cancel).await
    }

    async fn first(self, cancel: &CancellationToken) -> StoreResult<Option<T>> {
        Ok(self.take(1).run(cancel).await?.into_iter().next())
    }

    async fn count(self, cancel: &CancellationToken) -> StoreResult<usize> {
        Ok(self.run(cancel).await?.len())
    }

    async fn any(self, cancel: &CancellationToken) -> StoreResult<bool> {
        Ok(!self.take(1).run(cancel).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qspec_queries::testing::{catalogue, Order, Product};
    use qspec_queries::{field, SortDirection};

    fn ids(rows: &[Product]) -> Vec<i64> {
        rows.iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn test_filter_order_and_window() {
        let store = MemoryStore::with_rows(catalogue());
        let cancel = CancellationToken::new();

        let rows = store
            .query()
            .await
            .filter(&field::<Product>("Price").ge(80.0))
            .order_by(&SortCriterion::new("Price", SortDirection::Descending))
            .skip(1)
            .take(2)
            .to_list(&cancel)
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1, 4]);
    }

    #[tokio::test]
    async fn test_then_by_breaks_ties() {
        let store = MemoryStore::with_rows(catalogue());
        let rows = store
            .query()
            .await
            .order_by(&SortCriterion::new("Featured", SortDirection::Descending))
            .then_by(&SortCriterion::new("Rating", SortDirection::Ascending))
            .to_list(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 4, 3, 5]);
    }

    #[tokio::test]
    async fn test_order_by_float_with_nan() {
        let rows: Vec<Product> = (0..40)
            .map(|i| {
                let rating = if i % 3 == 0 { f64::NAN.abs() } else { (i % 7) as f64 };
                Product::sample("Lamp", 10.0, false, rating).with_id(i)
            })
            .collect();
        let store = MemoryStore::with_rows(rows);

        let sorted = store
            .query()
            .await
            .order_by(&SortCriterion::new("Rating", SortDirection::Ascending))
            .to_list(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sorted.len(), 40);
        let ratings: Vec<f64> = sorted.iter().map(|p| p.rating).collect();
        assert!(ratings[..26].windows(2).all(|w| w[0] <= w[1]));
        assert!(ratings[26..].iter().all(|r| r.is_nan()));
    }

    #[tokio::test]
    async fn test_store_filter_can_be_ignored() {
        let store = MemoryStore::with_rows(catalogue())
            .with_store_filter(field::<Product>("Featured").eq(true));
        let cancel = CancellationToken::new();

        assert_eq!(store.query().await.count(&cancel).await.unwrap(), 2);
        assert_eq!(
            store
                .query()
                .await
                .ignore_store_filters()
                .count(&cancel)
                .await
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn test_group_and_distinct() {
        let store = MemoryStore::with_rows(vec![
            Order::new(1, "A", 10.0).with_status("Shipped"),
            Order::new(2, "B", 20.0),
            Order::new(3, "C", 30.0).with_status("Shipped"),
        ]);
        let rows = store
            .query()
            .await
            .group_by("Status")
            .to_list(&CancellationToken::new())
            .await
            .unwrap();
        let numbers: Vec<_> = rows.iter().map(|o| o.number.as_str()).collect();
        assert_eq!(numbers, vec!["A", "C", "B"]);

        let twice = MemoryStore::with_rows(vec![Product::sample("Lamp", 5.0, false, 1.0); 2]);
        let rows = twice
            .query()
            .await
            .distinct()
            .to_list(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_include_paths_must_resolve() {
        let store: MemoryStore<Order> = MemoryStore::new();
        let query = store.query().await.include_path("Items.Product").unwrap();
        assert_eq!(query.includes(), &["Items.Product".to_string()]);

        let err = store.query().await.include_path("Items.Warehouse").err().unwrap();
        assert!(matches!(err, QueryError::Chain(ChainError::UnresolvedPath { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_materialization() {
        let store = MemoryStore::with_rows(catalogue());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = store.query().await.to_list(&cancel).await.unwrap_err();
        assert_eq!(err, StoreError::Cancelled);
    }

    #[tokio::test]
    async fn test_store_fault_is_raised_on_materialization() {
        let store = MemoryStore::with_rows(catalogue());
        store
            .fail_with(Some(StoreError::Unavailable("maintenance".into())))
            .await;

        let err = store
            .query()
            .await
            .any(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Unavailable("maintenance".into()));
    }

    #[tokio::test]
    async fn test_applied_log() {
        let store = MemoryStore::with_rows(catalogue());
        let query = store
            .query()
            .await
            .with_tracking(TrackingMode::NoTrack)
            .tag_with("listing")
            .filter(&field::<Product>("Featured").eq(true));
        assert_eq!(
            query.applied(),
            &["tracking NoTrack", "tag listing", "filter Featured == true"]
        );
        assert_eq!(query.tracking(), TrackingMode::NoTrack);
        assert_eq!(query.tags(), &["listing".to_string()]);
    }
}
