//! Specification
//!
//! The full, declarative description of a query: predicate, eager loads,
//! ordering, paging, grouping, provider hints and an optional projection.
//! A specification is built once through
//! [`SpecificationBuilder`](crate::builder::SpecificationBuilder) and is
//! read-only afterwards.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use qspec_core::{Entity, PageRequest};
use serde::{Deserialize, Serialize};

use crate::builder::SpecificationBuilder;
use crate::composition::PredicateSpec;
use crate::includes::IncludeNode;
use crate::predicate::Predicate;
use crate::sorts::SortCriterion;

/// How materialized entities are tracked by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    Track,
    NoTrack,
    /// Untracked, but one instance per identity within a result
    NoTrackIdentityResolution,
}

/// Skip/take paging window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub skip: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<usize>,
}

impl Paging {
    pub fn page(request: PageRequest) -> Self {
        Self {
            skip: request.skip(),
            take: Some(request.take()),
        }
    }

    /// Zero-based page index, when the window is page aligned
    pub fn page_index(&self) -> usize {
        match self.take {
            Some(take) if take > 0 => self.skip / take,
            _ => 0,
        }
    }
}

/// Global search over a set of string fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchClause {
    pub term: String,
    /// Canonical paths of the searched fields
    pub fields: Vec<String>,
}

/// A typed projection `T -> R`, with `R` erased
pub struct Selector<T> {
    project: Arc<dyn Any + Send + Sync>,
    result_type: TypeId,
    result_type_name: &'static str,
    _entity: PhantomData<fn(&T)>,
}

type Projection<T, R> = Box<dyn Fn(&T) -> R + Send + Sync>;

impl<T: 'static> Selector<T> {
    pub fn new<R, F>(project: F) -> Self
    where
        R: 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let project: Projection<T, R> = Box::new(project);
        Self {
            project: Arc::new(project),
            result_type: TypeId::of::<R>(),
            result_type_name: type_name::<R>(),
            _entity: PhantomData,
        }
    }

    pub fn result_type_name(&self) -> &'static str {
        self.result_type_name
    }

    pub fn projects_to<R: 'static>(&self) -> bool {
        self.result_type == TypeId::of::<R>()
    }

    /// The projection, if it yields `R`
    pub fn downcast<R: 'static>(&self) -> Option<&(dyn Fn(&T) -> R + Send + Sync)> {
        self.project
            .downcast_ref::<Projection<T, R>>()
            .map(|p| &**p)
    }
}

impl<T> Clone for Selector<T> {
    fn clone(&self) -> Self {
        Self {
            project: Arc::clone(&self.project),
            result_type: self.result_type,
            result_type_name: self.result_type_name,
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector(-> {})", self.result_type_name)
    }
}

/// A complete query specification for entities of type `T`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct Specification<T> {
    #[serde(default)]
    pub(crate) criteria: Predicate<T>,
    #[serde(default)]
    pub(crate) additional_criteria: Vec<Predicate<T>>,
    #[serde(default)]
    pub(crate) includes: Vec<IncludeNode>,
    #[serde(default)]
    pub(crate) include_chains: Vec<IncludeNode>,
    #[serde(default)]
    pub(crate) include_strings: Vec<String>,
    #[serde(default)]
    pub(crate) orderings: Vec<SortCriterion>,
    #[serde(default)]
    pub(crate) paging: Option<Paging>,
    #[serde(default)]
    pub(crate) limit: Option<usize>,
    #[serde(default)]
    pub(crate) group_key: Option<String>,
    #[serde(default)]
    pub(crate) distinct: bool,
    #[serde(default)]
    pub(crate) tracking: TrackingMode,
    #[serde(default)]
    pub(crate) ignore_store_filters: bool,
    #[serde(default)]
    pub(crate) split_fetch: bool,
    #[serde(default)]
    pub(crate) tag: Option<String>,
    #[serde(default)]
    pub(crate) search: Option<SearchClause>,
    #[serde(skip)]
    pub(crate) selector: Option<Selector<T>>,
}

impl<T> Default for Specification<T> {
    fn default() -> Self {
        Self {
            criteria: Predicate::always(),
            additional_criteria: Vec::new(),
            includes: Vec::new(),
            include_chains: Vec::new(),
            include_strings: Vec::new(),
            orderings: Vec::new(),
            paging: None,
            limit: None,
            group_key: None,
            distinct: false,
            tracking: TrackingMode::default(),
            ignore_store_filters: false,
            split_fetch: false,
            tag: None,
            search: None,
            selector: None,
        }
    }
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            additional_criteria: self.additional_criteria.clone(),
            includes: self.includes.clone(),
            include_chains: self.include_chains.clone(),
            include_strings: self.include_strings.clone(),
            orderings: self.orderings.clone(),
            paging: self.paging,
            limit: self.limit,
            group_key: self.group_key.clone(),
            distinct: self.distinct,
            tracking: self.tracking,
            ignore_store_filters: self.ignore_store_filters,
            split_fetch: self.split_fetch,
            tag: self.tag.clone(),
            search: self.search.clone(),
            selector: self.selector.clone(),
        }
    }
}

impl<T> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("criteria", &self.criteria)
            .field("additional_criteria", &self.additional_criteria)
            .field("includes", &self.includes)
            .field("include_chains", &self.include_chains)
            .field("include_strings", &self.include_strings)
            .field("orderings", &self.orderings)
            .field("paging", &self.paging)
            .field("limit", &self.limit)
            .field("group_key", &self.group_key)
            .field("distinct", &self.distinct)
            .field("tracking", &self.tracking)
            .field("tag", &self.tag)
            .field("search", &self.search)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl<T: Entity> Specification<T> {
    /// Start building a specification
    pub fn builder() -> SpecificationBuilder<T> {
        SpecificationBuilder::new()
    }

    /// A specification that matches every entity, unordered and unpaged
    pub fn all() -> Self {
        Self::default()
    }

    /// The core predicate AND every additional criterion
    pub fn to_expression(&self) -> Predicate<T> {
        self.additional_criteria
            .iter()
            .cloned()
            .fold(self.criteria.clone(), Predicate::and_also)
    }

    /// The same specification with paging and limit removed
    pub fn without_paging(&self) -> Self {
        let mut spec = self.clone();
        spec.paging = None;
        spec.limit = None;
        spec
    }
}

impl<T> Specification<T> {
    pub fn criteria(&self) -> &Predicate<T> {
        &self.criteria
    }

    pub fn additional_criteria(&self) -> &[Predicate<T>] {
        &self.additional_criteria
    }

    pub fn includes(&self) -> &[IncludeNode] {
        &self.includes
    }

    pub fn include_chains(&self) -> &[IncludeNode] {
        &self.include_chains
    }

    pub fn include_strings(&self) -> &[String] {
        &self.include_strings
    }

    pub fn orderings(&self) -> &[SortCriterion] {
        &self.orderings
    }

    pub fn paging(&self) -> Option<Paging> {
        self.paging
    }

    /// Paging counts as enabled once the window has a size
    pub fn is_paging_enabled(&self) -> bool {
        self.take().is_some()
    }

    pub fn skip(&self) -> Option<usize> {
        self.paging.map(|p| p.skip)
    }

    pub fn take(&self) -> Option<usize> {
        self.paging.and_then(|p| p.take)
    }

    pub fn page_index(&self) -> Option<usize> {
        self.paging.map(|p| p.page_index())
    }

    pub fn page_size(&self) -> Option<usize> {
        self.take()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn group_key(&self) -> Option<&str> {
        self.group_key.as_deref()
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn tracking(&self) -> TrackingMode {
        self.tracking
    }

    pub fn ignores_store_filters(&self) -> bool {
        self.ignore_store_filters
    }

    pub fn is_split_fetch(&self) -> bool {
        self.split_fetch
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn search(&self) -> Option<&SearchClause> {
        self.search.as_ref()
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_ref().map(|s| s.term.as_str())
    }

    pub fn search_fields(&self) -> &[String] {
        self.search
            .as_ref()
            .map(|s| s.fields.as_slice())
            .unwrap_or_default()
    }

    pub fn selector(&self) -> Option<&Selector<T>> {
        self.selector.as_ref()
    }

    pub fn selector_result_type(&self) -> Option<&'static str> {
        self.selector.as_ref().map(|s| s.result_type_name)
    }
}

impl<T: Entity> PredicateSpec<T> for Specification<T> {
    fn to_expression(&self) -> Predicate<T> {
        Specification::to_expression(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::field;
    use crate::testing::Product;

    #[test]
    fn test_paging_page_index() {
        let paging = Paging::page(PageRequest::new(2, 20));
        assert_eq!(paging.skip, 40);
        assert_eq!(paging.page_index(), 2);
        assert_eq!(Paging { skip: 5, take: None }.page_index(), 0);
    }

    #[test]
    fn test_to_expression_combines_additional_criteria() {
        let mut spec = Specification::<Product>::all();
        assert!(spec.to_expression().is_identity());

        spec.criteria = field::<Product>("Featured").eq(true);
        spec.additional_criteria.push(field::<Product>("Price").lt(100.0));
        assert_eq!(
            spec.to_expression().to_string(),
            "Featured == true AND Price < 100"
        );
    }

    #[test]
    fn test_without_paging_keeps_everything_else() {
        let mut spec = Specification::<Product>::all();
        spec.paging = Some(Paging::page(PageRequest::new(1, 10)));
        spec.limit = Some(3);
        spec.tag = Some("catalogue".into());

        let unpaged = spec.without_paging();
        assert!(!unpaged.is_paging_enabled());
        assert_eq!(unpaged.limit(), None);
        assert_eq!(unpaged.tag(), Some("catalogue"));
        assert!(spec.is_paging_enabled());
    }

    #[test]
    fn test_skip_alone_does_not_enable_paging() {
        let mut spec = Specification::<Product>::all();
        spec.paging = Some(Paging {
            skip: 5,
            take: None,
        });
        assert!(!spec.is_paging_enabled());
        assert_eq!(spec.skip(), Some(5));
        assert_eq!(spec.page_size(), None);
    }

    #[test]
    fn test_selector_downcast() {
        let selector = Selector::<Product>::new(|p: &Product| p.name.clone());
        assert!(selector.projects_to::<String>());
        assert!(selector.downcast::<u32>().is_none());

        let project = selector.downcast::<String>().unwrap();
        assert_eq!(project(&Product::sample("Lamp", 1.0, false, 1.0)), "Lamp");
        assert!(selector.result_type_name().ends_with("String"));
    }

    #[test]
    fn test_serialization_skips_selector() {
        let mut spec = Specification::<Product>::all();
        spec.orderings.push(SortCriterion::new("Name", crate::sorts::SortDirection::Ascending));
        spec.selector = Some(Selector::new(|p: &Product| p.id));

        let json = serde_json::to_value(&spec).unwrap();
        assert!(json.get("selector").is_none());
        assert_eq!(json["orderings"][0]["field"], "Name");

        let back: Specification<Product> = serde_json::from_value(json).unwrap();
        assert!(back.selector().is_none());
        assert_eq!(back.orderings(), spec.orderings());
    }
}
