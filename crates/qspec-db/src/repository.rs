//! Specification repositories
//!
//! A repository compiles a specification into a plan, applies it to a fresh
//! query from its source and runs one terminal operation. Compilation
//! faults surface before the store is touched; store faults come back
//! unchanged inside [`QueryError::Store`].

use std::any::type_name;

use async_trait::async_trait;
use qspec_core::{Entity, PageRequest, PageResult, QueryConfig, QueryError, QueryResult};
use qspec_queries::{
    FilterCompiler, FilterModel, PredicateSpec, Specification, SpecificationEvaluator,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::source::{Materialize, QuerySource};

/// Read operations driven by specifications
#[async_trait]
pub trait SpecificationRepository<T: Entity>: Send + Sync {
    /// Every entity matching the specification
    async fn find_many(
        &self,
        spec: &Specification<T>,
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<T>>;

    /// The first entity matching the specification
    async fn find_one(
        &self,
        spec: &Specification<T>,
        cancel: &CancellationToken,
    ) -> QueryResult<Option<T>>;

    /// Whether anything matches, ignoring paging
    async fn exists(&self, spec: &Specification<T>, cancel: &CancellationToken) -> QueryResult<bool>;

    /// Number of matches, ignoring paging
    async fn count(&self, spec: &Specification<T>, cancel: &CancellationToken)
        -> QueryResult<usize>;

    /// One page of matches plus totals
    async fn find_paged(
        &self,
        spec: &Specification<T>,
        cancel: &CancellationToken,
    ) -> QueryResult<PageResult<T>>;
}

/// Repository over any [`QuerySource`]
pub struct SpecRepository<S> {
    source: S,
    compiler: FilterCompiler,
}

impl<S> SpecRepository<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, QueryConfig::default())
    }

    pub fn with_config(source: S, config: QueryConfig) -> Self {
        Self {
            source,
            compiler: FilterCompiler::new(config),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &QueryConfig {
        self.compiler.config()
    }

    /// Compile `spec` and apply it to a fresh query
    async fn prepare<T>(&self, spec: &Specification<T>) -> QueryResult<S::Query>
    where
        T: Entity,
        S: QuerySource<T>,
    {
        let plan = SpecificationEvaluator::compile(spec)?;
        debug!(entity = T::type_name(), operations = ?plan.names(), "Applying plan");
        plan.apply(self.source.query().await)
    }
}

#[async_trait]
impl<T, S> SpecificationRepository<T> for SpecRepository<S>
where
    T: Entity,
    S: QuerySource<T>,
{
    #[instrument(skip(self, spec, cancel), fields(entity = T::type_name()))]
    async fn find_many(
        &self,
        spec: &Specification<T>,
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<T>> {
        let query = self.prepare(spec).await?;
        Ok(query.to_list(cancel).await?)
    }

    #[instrument(skip(self, spec, cancel), fields(entity = T::type_name()))]
    async fn find_one(
        &self,
        spec: &Specification<T>,
        cancel: &CancellationToken,
    ) -> QueryResult<Option<T>> {
        let query = self.prepare(spec).await?;
        Ok(query.first(cancel).await?)
    }

    #[instrument(skip(self, spec, cancel), fields(entity = T::type_name()))]
    async fn exists(&self, spec: &Specification<T>, cancel: &CancellationToken) -> QueryResult<bool> {
        let query = self.prepare(&spec.without_paging()).await?;
        Ok(query.any(cancel).await?)
    }

    #[instrument(skip(self, spec, cancel), fields(entity = T::type_name()))]
    async fn count(
        &self,
        spec: &Specification<T>,
        cancel: &CancellationToken,
    ) -> QueryResult<usize> {
        let query = self.prepare(&spec.without_paging()).await?;
        Ok(query.count(cancel).await?)
    }

    #[instrument(skip(self, spec, cancel), fields(entity = T::type_name()))]
    async fn find_paged(
        &self,
        spec: &Specification<T>,
        cancel: &CancellationToken,
    ) -> QueryResult<PageResult<T>> {
        let Some(page_size) = spec.page_size() else {
            warn!("Paged query on a specification without a page size");
            return Err(QueryError::PagingNotEnabled);
        };

        let total_count = self.count(spec, cancel).await?;
        let items = self.find_many(spec, cancel).await?;
        let page_index = spec.page_index().unwrap_or(0);

        debug!(total_count, page_index, page_size, "Page loaded");
        Ok(PageResult::new(items, page_index, page_size, total_count))
    }
}

impl<S> SpecRepository<S> {
    /// Matches projected through the specification's selector
    #[instrument(skip(self, spec, cancel), fields(entity = T::type_name()))]
    pub async fn find_projected<T, R>(
        &self,
        spec: &Specification<T>,
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<R>>
    where
        T: Entity,
        R: Send + 'static,
        S: QuerySource<T>,
    {
        let selector = spec.selector().ok_or(QueryError::MissingProjection)?;
        let Some(project) = selector.downcast::<R>() else {
            warn!(
                expected = selector.result_type_name(),
                requested = type_name::<R>(),
                "Projection type mismatch"
            );
            return Err(QueryError::ProjectionMismatch {
                expected: selector.result_type_name(),
                requested: type_name::<R>(),
            });
        };

        let rows = self.find_many(spec, cancel).await?;
        Ok(rows.iter().map(project).collect())
    }

    /// Compile a filter model and load one page of its matches.
    ///
    /// Without a page request every match comes back as a single page.
    #[instrument(skip(self, model, cancel), fields(entity = T::type_name()))]
    pub async fn find_by_filter<T>(
        &self,
        model: &FilterModel,
        page: Option<PageRequest>,
        cancel: &CancellationToken,
    ) -> QueryResult<PageResult<T>>
    where
        T: Entity,
        S: QuerySource<T>,
    {
        let builder = Specification::<T>::builder().apply_filter_model(model, &self.compiler)?;
        match page {
            Some(request) => {
                let spec = builder.page(request.clamped(self.config())).build()?;
                self.find_paged(&spec, cancel).await
            }
            None => {
                let spec = builder.build()?;
                let items = self.find_many(&spec, cancel).await?;
                let total = items.len();
                Ok(PageResult::new(items, 0, total, total))
            }
        }
    }

    /// Entities satisfying a composed predicate specification
    pub async fn find_matching<T, P>(
        &self,
        predicate: &P,
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<T>>
    where
        T: Entity,
        P: PredicateSpec<T> + Sync,
        S: QuerySource<T>,
    {
        let spec = Specification::<T>::builder().where_spec(predicate).build()?;
        self.find_many(&spec, cancel).await
    }

    pub async fn count_matching<T, P>(
        &self,
        predicate: &P,
        cancel: &CancellationToken,
    ) -> QueryResult<usize>
    where
        T: Entity,
        P: PredicateSpec<T> + Sync,
        S: QuerySource<T>,
    {
        let spec = Specification::<T>::builder().where_spec(predicate).build()?;
        self.count(&spec, cancel).await
    }
}
