//! Specification Builder
//!
//! Provides a fluent API for constructing specifications. Every mutator
//! checks its own arguments against the entity schema; problems are
//! collected and reported together by [`SpecificationBuilder::build`].

use qspec_core::{Entity, PageRequest, QueryError, QueryResult, ValidationErrors};
use tracing::{debug, warn};

use crate::composition::PredicateSpec;
use crate::filter_compiler::FilterCompiler;
use crate::filters::FilterModel;
use crate::includes::{ChainBuilder, Relation};
use crate::predicate::Predicate;
use crate::sorts::{SortCriterion, SortDirection};
use crate::specification::{Paging, SearchClause, Selector, Specification, TrackingMode};

/// Builder for constructing specifications fluently
#[derive(Debug)]
pub struct SpecificationBuilder<T> {
    spec: Specification<T>,
    errors: ValidationErrors,
    ordered: bool,
}

impl<T: Entity> Default for SpecificationBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> SpecificationBuilder<T> {
    /// Create a builder for a match-everything specification
    pub fn new() -> Self {
        Self {
            spec: Specification::default(),
            errors: ValidationErrors::new(),
            ordered: false,
        }
    }

    // Criteria

    /// Set the core predicate, replacing any previous one
    pub fn where_expr(mut self, predicate: Predicate<T>) -> Self {
        self.spec.criteria = self.checked(predicate);
        self
    }

    /// Use a predicate specification as the core predicate
    pub fn where_spec<S: PredicateSpec<T>>(self, spec: &S) -> Self {
        self.where_expr(spec.to_expression())
    }

    /// Add a criterion that is AND-combined with the core predicate
    pub fn and_where(mut self, predicate: Predicate<T>) -> Self {
        let predicate = self.checked(predicate);
        self.spec.additional_criteria.push(predicate);
        self
    }

    fn checked(&mut self, predicate: Predicate<T>) -> Predicate<T> {
        match predicate.expr().clone().canonicalize(T::schema()) {
            Ok(expr) => Predicate::from_expr(expr),
            Err(unknown) => {
                for field in unknown {
                    self.unknown_field(field);
                }
                predicate
            }
        }
    }

    // Eager loading

    /// Attach a single related link
    pub fn include<N: Entity>(mut self, relation: Relation<T, N>) -> Self {
        if !relation.is_declared() {
            self.errors
                .add("include", format!("{} is not a navigation of {}", relation.name(), T::type_name()));
        }
        self.spec.includes.push(relation.node());
        self
    }

    /// Attach a link and continue the chain below it
    pub fn include_chain<N, F>(mut self, relation: Relation<T, N>, build: F) -> Self
    where
        N: Entity,
        F: FnOnce(ChainBuilder<N>) -> ChainBuilder<N>,
    {
        let (node, undeclared) = build(ChainBuilder::start(relation)).finish();
        for link in undeclared {
            self.errors.add("include", format!("{} is not a declared navigation", link));
        }
        self.spec.include_chains.push(node);
        self
    }

    /// Attach a dotted navigation path such as `Items.Product`
    pub fn include_path(mut self, path: &str) -> Self {
        match T::schema().resolve_relations(path) {
            Some(links) => {
                let canonical = links.iter().map(|r| r.name).collect::<Vec<_>>().join(".");
                self.spec.include_strings.push(canonical);
            }
            None => self
                .errors
                .add("include", format!("{} is not a navigation path of {}", path, T::type_name())),
        }
        self
    }

    // Ordering

    /// Primary ascending sort
    pub fn order_by(self, field: &str) -> Self {
        self.primary(field, SortDirection::Ascending)
    }

    /// Primary descending sort
    pub fn order_by_descending(self, field: &str) -> Self {
        self.primary(field, SortDirection::Descending)
    }

    /// Secondary ascending sort, applied after the previous ones
    pub fn then_by(self, field: &str) -> Self {
        self.secondary(field, SortDirection::Ascending)
    }

    /// Secondary descending sort, applied after the previous ones
    pub fn then_by_descending(self, field: &str) -> Self {
        self.secondary(field, SortDirection::Descending)
    }

    fn primary(mut self, field: &str, direction: SortDirection) -> Self {
        if self.ordered {
            self.errors
                .add_base("order_by may only be used once; use then_by for further keys");
        }
        self.ordered = true;
        self.push_ordering(field, direction);
        self
    }

    fn secondary(mut self, field: &str, direction: SortDirection) -> Self {
        if !self.ordered {
            self.errors.add_base("then_by requires a preceding order_by");
        }
        self.push_ordering(field, direction);
        self
    }

    fn push_ordering(&mut self, field: &str, direction: SortDirection) {
        if let Some(path) = self.resolve(field) {
            self.spec.orderings.push(SortCriterion::new(path, direction));
        }
    }

    // Paging

    /// Zero-based page window: skips `page_index * page_size` rows
    pub fn paginate(mut self, page_index: usize, page_size: usize) -> Self {
        if page_size == 0 {
            self.errors.add("page_size", "must be greater than zero");
            return self;
        }
        self.spec.paging = Some(Paging::page(PageRequest::new(page_index, page_size)));
        self
    }

    /// Page window from a request
    pub fn page(self, request: PageRequest) -> Self {
        self.paginate(request.page_index, request.page_size)
    }

    pub fn skip(mut self, count: usize) -> Self {
        let paging = self.spec.paging.get_or_insert_with(Paging::default);
        paging.skip = count;
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        if count == 0 {
            self.errors.add("take", "must be greater than zero");
            return self;
        }
        let paging = self.spec.paging.get_or_insert_with(Paging::default);
        paging.take = Some(count);
        self
    }

    /// Cap the result count; ignored when paging is enabled
    pub fn limit(mut self, count: usize) -> Self {
        if count == 0 {
            self.errors.add("limit", "must be greater than zero");
            return self;
        }
        self.spec.limit = Some(count);
        self
    }

    // Shape

    pub fn group_by(mut self, field: &str) -> Self {
        if let Some(path) = self.resolve(field) {
            self.spec.group_key = Some(path);
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.spec.distinct = true;
        self
    }

    // Store hints

    pub fn tracking(mut self, mode: TrackingMode) -> Self {
        self.spec.tracking = mode;
        self
    }

    pub fn as_no_tracking(self) -> Self {
        self.tracking(TrackingMode::NoTrack)
    }

    pub fn as_no_tracking_with_identity_resolution(self) -> Self {
        self.tracking(TrackingMode::NoTrackIdentityResolution)
    }

    /// Bypass filters the store applies globally (tenancy, soft delete)
    pub fn ignore_store_filters(mut self) -> Self {
        self.spec.ignore_store_filters = true;
        self
    }

    /// Load collection includes with separate fetches
    pub fn split_fetch(mut self) -> Self {
        self.spec.split_fetch = true;
        self
    }

    /// Attach a diagnostic tag to the query
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if tag.trim().is_empty() {
            self.errors.add("tag", "must not be blank");
        } else {
            self.spec.tag = Some(tag);
        }
        self
    }

    // Search

    /// Case-insensitive containment search over `fields`.
    ///
    /// With no fields, every string field of the entity is searched. A blank
    /// term clears the search.
    pub fn search(mut self, term: &str, fields: &[&str]) -> Self {
        let term = term.trim();
        if term.is_empty() {
            self.spec.search = None;
            return self;
        }

        let fields = if fields.is_empty() {
            T::schema().string_fields()
        } else {
            let mut resolved = Vec::with_capacity(fields.len());
            for field in fields {
                match T::schema().resolve_path(field) {
                    Some(r) if r.descriptor.field_type.is_string() => resolved.push(r.path),
                    Some(r) => self.errors.add(r.path, "is not a string field and cannot be searched"),
                    None => self.unknown_field(field.to_string()),
                }
            }
            resolved
        };

        self.spec.search = Some(SearchClause {
            term: term.to_string(),
            fields,
        });
        self
    }

    // Projection

    /// Project results to `R`
    pub fn select<R, F>(mut self, project: F) -> Self
    where
        R: 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        self.spec.selector = Some(Selector::new(project));
        self
    }

    // Filter models

    /// Merge a compiled filter model: its predicate joins the criteria and
    /// its resolvable sorts are appended to the orderings
    pub fn apply_filter_model(
        mut self,
        model: &FilterModel,
        compiler: &FilterCompiler,
    ) -> QueryResult<Self> {
        let predicate = compiler.compile::<T>(model)?;
        if !predicate.is_identity() {
            self.spec.additional_criteria.push(predicate);
        }
        let sorts = compiler.compile_sorts::<T>(&model.sorts);
        debug!(entity = T::type_name(), sorts = sorts.len(), "Filter model applied");
        self.ordered |= !sorts.is_empty();
        self.spec.orderings.extend(sorts);
        Ok(self)
    }

    fn resolve(&mut self, field: &str) -> Option<String> {
        match T::schema().resolve_path(field) {
            Some(resolved) => Some(resolved.path),
            None => {
                self.unknown_field(field.to_string());
                None
            }
        }
    }

    fn unknown_field(&mut self, field: String) {
        self.errors
            .add(field, format!("is not a field of {}", T::type_name()));
    }

    /// Argument problems recorded so far
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Build the specification
    pub fn build(self) -> QueryResult<Specification<T>> {
        if let Err(errors) = self.errors.into_result() {
            warn!(
                entity = T::type_name(),
                errors = %errors,
                "Rejected invalid specification"
            );
            return Err(QueryError::InvalidSpecification(errors));
        }
        Ok(self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{FilterItem, FilterOperator};
    use crate::predicate::field;
    use crate::testing::relations::*;
    use crate::testing::{Order, Product};

    #[test]
    fn test_builder_basic() {
        let spec = Specification::<Product>::builder().build().unwrap();
        assert!(spec.criteria().is_identity());
        assert!(!spec.is_paging_enabled());
        assert_eq!(spec.tracking(), TrackingMode::Track);
    }

    #[test]
    fn test_paginate_is_zero_based() {
        let spec = Specification::<Product>::builder()
            .paginate(2, 20)
            .build()
            .unwrap();
        assert_eq!(spec.skip(), Some(40));
        assert_eq!(spec.take(), Some(20));
        assert_eq!(spec.page_index(), Some(2));
    }

    #[test]
    fn test_builder_with_orderings() {
        let spec = Specification::<Product>::builder()
            .order_by("featured")
            .then_by_descending("PRICE")
            .build()
            .unwrap();
        assert_eq!(
            spec.orderings(),
            &[
                SortCriterion::new("Featured", SortDirection::Ascending),
                SortCriterion::new("Price", SortDirection::Descending),
            ]
        );
    }

    #[test]
    fn test_build_reports_every_problem() {
        let err = Specification::<Product>::builder()
            .where_expr(field::<Product>("Colour").eq("red"))
            .then_by("Name")
            .order_by("Weight")
            .paginate(0, 0)
            .group_by("Shelf")
            .tag("  ")
            .build()
            .unwrap_err();

        let QueryError::InvalidSpecification(errors) = err else {
            panic!("expected a validation failure");
        };
        assert!(errors.has_error("Colour"));
        assert!(errors.has_error("Weight"));
        assert!(errors.has_error("Shelf"));
        assert!(errors.has_error("page_size"));
        assert!(errors.has_error("tag"));
        assert_eq!(errors.base_errors, vec!["then_by requires a preceding order_by"]);
    }

    #[test]
    fn test_predicates_are_canonicalized() {
        let spec = Specification::<Product>::builder()
            .where_expr(Predicate::from_expr(crate::predicate::Expr::compare(
                "price",
                crate::predicate::CompareOp::Gt,
                10,
            )))
            .build()
            .unwrap();
        assert_eq!(spec.criteria().to_string(), "Price > 10");
    }

    #[test]
    fn test_builder_includes() {
        let spec = Specification::<Order>::builder()
            .include(ORDER_CUSTOMER)
            .include_chain(ORDER_ITEMS, |items| items.then_include(ITEM_PRODUCT))
            .include_path("items.product.reviews")
            .build()
            .unwrap();

        assert_eq!(spec.includes()[0].return_type, "Customer");
        assert_eq!(spec.include_chains()[0].children[0].owner_type, "OrderItem");
        assert_eq!(spec.include_strings(), &["Items.Product.Reviews".to_string()]);
    }

    #[test]
    fn test_unresolvable_include_path() {
        let err = Specification::<Order>::builder()
            .include_path("Items.Warehouse")
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_specification");
    }

    #[test]
    fn test_search_fields() {
        let spec = Specification::<Product>::builder()
            .search("widget", &[])
            .build()
            .unwrap();
        assert_eq!(
            spec.search_fields(),
            &["Name", "Description", "Supplier.Name", "Supplier.Email"]
        );

        let err = Specification::<Product>::builder()
            .search("widget", &["Price"])
            .build()
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidSpecification(ref e) if e.has_error("Price")));

        let spec = Specification::<Product>::builder()
            .search("  ", &["Name"])
            .build()
            .unwrap();
        assert!(spec.search().is_none());
    }

    #[test]
    fn test_builder_hints() {
        let spec = Specification::<Product>::builder()
            .as_no_tracking_with_identity_resolution()
            .ignore_store_filters()
            .split_fetch()
            .distinct()
            .limit(3)
            .tag("catalogue listing")
            .select(|p: &Product| p.name.clone())
            .build()
            .unwrap();

        assert_eq!(spec.tracking(), TrackingMode::NoTrackIdentityResolution);
        assert!(spec.ignores_store_filters());
        assert!(spec.is_split_fetch());
        assert!(spec.is_distinct());
        assert_eq!(spec.limit(), Some(3));
        assert_eq!(spec.tag(), Some("catalogue listing"));
        assert!(spec.selector_result_type().is_some());
    }

    #[test]
    fn test_apply_filter_model() {
        let model = FilterModel::new()
            .where_field("Price", FilterOperator::LessThan, "100")
            .with(FilterItem::contains("Name", "widget"))
            .sort_by("rating", SortDirection::Descending);

        let spec = Specification::<Product>::builder()
            .where_expr(field::<Product>("Featured").eq(true))
            .apply_filter_model(&model, &FilterCompiler::default())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            spec.to_expression().to_string(),
            "Featured == true AND Price < 100 AND Name contains \"widget\""
        );
        assert_eq!(spec.orderings()[0].field, "Rating");
    }

    #[test]
    fn test_apply_filter_model_rejects_unknown_operator() {
        let model = FilterModel::new().with(FilterItem::raw("Price", "approx", Some("1".into())));
        let result = Specification::<Product>::builder()
            .apply_filter_model(&model, &FilterCompiler::default());
        assert!(matches!(result, Err(QueryError::UnknownOperator { .. })));
    }
}
