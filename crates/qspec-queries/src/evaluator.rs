//! Query Plan Compiler
//!
//! Translates a [`Specification`] into an ordered [`QueryPlan`] and applies
//! that plan to a [`Queryable`] source. Compilation is pure and single-pass:
//! either a complete plan comes out, or the first structural error does,
//! before anything touches the store.
//!
//! Operations are emitted in a fixed order, each only when configured:
//!
//! 1. tracking mode
//! 2. ignore store filters
//! 3. diagnostic tag
//! 4. split fetch (must precede includes)
//! 5. core predicate
//! 6. additional criteria, AND-combined
//! 7. search
//! 8. single-level includes
//! 9. chained includes
//! 10. string-path includes
//! 11. grouping
//! 12. distinct
//! 13. ordering (primary, then secondary keys in order)
//! 14. paging, or a result cap when paging is off

use std::fmt;

use qspec_core::{Entity, QueryError, QueryResult};
use tracing::{debug, trace};

use crate::includes::{resolve_chain, resolve_include, IncludeOp};
use crate::predicate::{Expr, Predicate, TextOp};
use crate::queryable::Queryable;
use crate::sorts::SortCriterion;
use crate::specification::{SearchClause, Specification, TrackingMode};

/// One step of a compiled plan
pub enum QueryOp<T> {
    Tracking(TrackingMode),
    IgnoreStoreFilters,
    Tag(String),
    SplitFetch,
    Filter(Predicate<T>),
    Criteria(Predicate<T>),
    Search(Predicate<T>),
    Include(IncludeOp),
    ChainInclude(IncludeOp),
    IncludePath(String),
    GroupBy(String),
    Distinct,
    OrderBy(SortCriterion),
    ThenBy(SortCriterion),
    Skip(usize),
    Take(usize),
    Limit(usize),
}

impl<T> QueryOp<T> {
    /// Position of the operation in the fixed plan order (1-based)
    pub fn step(&self) -> u8 {
        match self {
            QueryOp::Tracking(_) => 1,
            QueryOp::IgnoreStoreFilters => 2,
            QueryOp::Tag(_) => 3,
            QueryOp::SplitFetch => 4,
            QueryOp::Filter(_) => 5,
            QueryOp::Criteria(_) => 6,
            QueryOp::Search(_) => 7,
            QueryOp::Include(_) => 8,
            QueryOp::ChainInclude(_) => 9,
            QueryOp::IncludePath(_) => 10,
            QueryOp::GroupBy(_) => 11,
            QueryOp::Distinct => 12,
            QueryOp::OrderBy(_) | QueryOp::ThenBy(_) => 13,
            QueryOp::Skip(_) | QueryOp::Take(_) | QueryOp::Limit(_) => 14,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryOp::Tracking(_) => "tracking",
            QueryOp::IgnoreStoreFilters => "ignore_store_filters",
            QueryOp::Tag(_) => "tag",
            QueryOp::SplitFetch => "split_fetch",
            QueryOp::Filter(_) => "filter",
            QueryOp::Criteria(_) => "criteria",
            QueryOp::Search(_) => "search",
            QueryOp::Include(_) => "include",
            QueryOp::ChainInclude(_) => "chain_include",
            QueryOp::IncludePath(_) => "include_path",
            QueryOp::GroupBy(_) => "group_by",
            QueryOp::Distinct => "distinct",
            QueryOp::OrderBy(_) => "order_by",
            QueryOp::ThenBy(_) => "then_by",
            QueryOp::Skip(_) => "skip",
            QueryOp::Take(_) => "take",
            QueryOp::Limit(_) => "limit",
        }
    }

    fn apply<Q: Queryable<T>>(&self, source: Q) -> QueryResult<Q>
    where
        T: Entity,
    {
        Ok(match self {
            QueryOp::Tracking(mode) => source.with_tracking(*mode),
            QueryOp::IgnoreStoreFilters => source.ignore_store_filters(),
            QueryOp::Tag(tag) => source.tag_with(tag),
            QueryOp::SplitFetch => source.split_fetch(),
            QueryOp::Filter(p) | QueryOp::Criteria(p) | QueryOp::Search(p) => source.filter(p),
            QueryOp::Include(op) | QueryOp::ChainInclude(op) => source.include(op)?,
            QueryOp::IncludePath(path) => source.include_path(path)?,
            QueryOp::GroupBy(key) => source.group_by(key),
            QueryOp::Distinct => source.distinct(),
            QueryOp::OrderBy(c) => source.order_by(c),
            QueryOp::ThenBy(c) => source.then_by(c),
            QueryOp::Skip(n) => source.skip(*n),
            QueryOp::Take(n) | QueryOp::Limit(n) => source.take(*n),
        })
    }
}

impl<T> Clone for QueryOp<T> {
    fn clone(&self) -> Self {
        match self {
            QueryOp::Tracking(mode) => QueryOp::Tracking(*mode),
            QueryOp::IgnoreStoreFilters => QueryOp::IgnoreStoreFilters,
            QueryOp::Tag(tag) => QueryOp::Tag(tag.clone()),
            QueryOp::SplitFetch => QueryOp::SplitFetch,
            QueryOp::Filter(p) => QueryOp::Filter(p.clone()),
            QueryOp::Criteria(p) => QueryOp::Criteria(p.clone()),
            QueryOp::Search(p) => QueryOp::Search(p.clone()),
            QueryOp::Include(op) => QueryOp::Include(op.clone()),
            QueryOp::ChainInclude(op) => QueryOp::ChainInclude(op.clone()),
            QueryOp::IncludePath(path) => QueryOp::IncludePath(path.clone()),
            QueryOp::GroupBy(key) => QueryOp::GroupBy(key.clone()),
            QueryOp::Distinct => QueryOp::Distinct,
            QueryOp::OrderBy(c) => QueryOp::OrderBy(c.clone()),
            QueryOp::ThenBy(c) => QueryOp::ThenBy(c.clone()),
            QueryOp::Skip(n) => QueryOp::Skip(*n),
            QueryOp::Take(n) => QueryOp::Take(*n),
            QueryOp::Limit(n) => QueryOp::Limit(*n),
        }
    }
}

impl<T> fmt::Display for QueryOp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOp::Tracking(mode) => write!(f, "tracking {:?}", mode),
            QueryOp::Tag(tag) => write!(f, "tag {:?}", tag),
            QueryOp::Filter(p) | QueryOp::Criteria(p) | QueryOp::Search(p) => {
                write!(f, "{} {}", self.name(), p)
            }
            QueryOp::Include(op) | QueryOp::ChainInclude(op) => {
                write!(f, "{} {}", self.name(), op.navigation())
            }
            QueryOp::IncludePath(path) | QueryOp::GroupBy(path) => {
                write!(f, "{} {}", self.name(), path)
            }
            QueryOp::OrderBy(c) | QueryOp::ThenBy(c) => {
                write!(f, "{} {} {}", self.name(), c.field, c.direction.as_str())
            }
            QueryOp::Skip(n) | QueryOp::Take(n) | QueryOp::Limit(n) => {
                write!(f, "{} {}", self.name(), n)
            }
            other => f.write_str(other.name()),
        }
    }
}

impl<T> fmt::Debug for QueryOp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryOp({})", self)
    }
}

/// An ordered, not yet applied sequence of query operations
pub struct QueryPlan<T> {
    ops: Vec<QueryOp<T>>,
}

impl<T> QueryPlan<T> {
    pub fn ops(&self) -> &[QueryOp<T>] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Operation names in application order
    pub fn names(&self) -> Vec<&'static str> {
        self.ops.iter().map(QueryOp::name).collect()
    }
}

impl<T: Entity> QueryPlan<T> {
    /// Apply every operation, in order, to `source`
    pub fn apply<Q: Queryable<T>>(&self, source: Q) -> QueryResult<Q> {
        self.ops.iter().try_fold(source, |query, op| op.apply(query))
    }
}

impl<T> Clone for QueryPlan<T> {
    fn clone(&self) -> Self {
        Self {
            ops: self.ops.clone(),
        }
    }
}

impl<T> fmt::Debug for QueryPlan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ops.iter()).finish()
    }
}

/// Compiles specifications into query plans
pub struct SpecificationEvaluator;

impl SpecificationEvaluator {
    /// Compile a specification into a plan
    pub fn compile<T: Entity>(spec: &Specification<T>) -> QueryResult<QueryPlan<T>> {
        let mut ops = Vec::new();

        build_hints(spec, &mut ops);
        build_criteria(spec, &mut ops);
        build_includes(spec, &mut ops)?;

        if let Some(key) = spec.group_key() {
            ops.push(QueryOp::GroupBy(key.to_string()));
        }
        if spec.is_distinct() {
            ops.push(QueryOp::Distinct);
        }

        build_orderings(spec.orderings(), &mut ops);
        build_window(spec, &mut ops);

        debug!(
            entity = T::type_name(),
            operations = ops.len(),
            "Compiled specification"
        );
        Ok(QueryPlan { ops })
    }

    /// Compile a specification and apply it to `source`
    pub fn evaluate<T, Q>(spec: &Specification<T>, source: Q) -> QueryResult<Q>
    where
        T: Entity,
        Q: Queryable<T>,
    {
        Self::compile(spec)?.apply(source)
    }
}

fn build_hints<T>(spec: &Specification<T>, ops: &mut Vec<QueryOp<T>>) {
    if spec.tracking() != TrackingMode::Track {
        ops.push(QueryOp::Tracking(spec.tracking()));
    }
    if spec.ignores_store_filters() {
        ops.push(QueryOp::IgnoreStoreFilters);
    }
    if let Some(tag) = spec.tag() {
        ops.push(QueryOp::Tag(tag.to_string()));
    }
    if spec.is_split_fetch() {
        ops.push(QueryOp::SplitFetch);
    }
}

fn build_criteria<T: Entity>(spec: &Specification<T>, ops: &mut Vec<QueryOp<T>>) {
    if !spec.criteria().is_identity() {
        ops.push(QueryOp::Filter(spec.criteria().clone()));
    }

    let additional = Expr::all(
        spec.additional_criteria()
            .iter()
            .map(|p| p.expr().clone()),
    );
    if !additional.is_true() {
        ops.push(QueryOp::Criteria(Predicate::from_expr(additional)));
    }

    if let Some(search) = spec.search() {
        let predicate = build_search(search);
        if !predicate.is_identity() {
            ops.push(QueryOp::Search(predicate));
        }
    }
}

/// OR of null-guarded, case-insensitive containment tests
fn build_search<T>(search: &SearchClause) -> Predicate<T> {
    if search.term.trim().is_empty() || search.fields.is_empty() {
        return Predicate::always();
    }
    Predicate::from_expr(Expr::any(
        search
            .fields
            .iter()
            .map(|f| Expr::text(f.clone(), TextOp::Contains, search.term.trim())),
    ))
}

fn build_includes<T: Entity>(spec: &Specification<T>, ops: &mut Vec<QueryOp<T>>) -> QueryResult<()> {
    for node in spec.includes() {
        ops.push(QueryOp::Include(resolve_include(node).map_err(chain_fault)?));
    }

    for root in spec.include_chains() {
        let resolved = resolve_chain(root).map_err(chain_fault)?;
        for op in resolved {
            if let IncludeOp::ThenInclude { shape, target_type, .. } = &op {
                trace!(navigation = %op.navigation(), ?shape, target = %target_type, "Chain continuation");
            }
            ops.push(QueryOp::ChainInclude(op));
        }
    }

    for path in spec.include_strings() {
        ops.push(QueryOp::IncludePath(path.clone()));
    }
    Ok(())
}

fn chain_fault(err: qspec_core::ChainError) -> QueryError {
    tracing::warn!(error = %err, "Include chain cannot be resolved");
    QueryError::Chain(err)
}

fn build_orderings<T>(orderings: &[SortCriterion], ops: &mut Vec<QueryOp<T>>) {
    let mut keys = orderings.iter();
    if let Some(primary) = keys.next() {
        ops.push(QueryOp::OrderBy(primary.clone()));
    }
    ops.extend(keys.cloned().map(QueryOp::ThenBy));
}

fn build_window<T>(spec: &Specification<T>, ops: &mut Vec<QueryOp<T>>) {
    match spec.paging() {
        Some(paging) => {
            if paging.skip > 0 {
                ops.push(QueryOp::Skip(paging.skip));
            }
            match (paging.take, spec.limit()) {
                (Some(take), _) => ops.push(QueryOp::Take(take)),
                (None, Some(limit)) => ops.push(QueryOp::Limit(limit)),
                (None, None) => {}
            }
        }
        None => {
            if let Some(limit) = spec.limit() {
                ops.push(QueryOp::Limit(limit));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::includes::{ChainShape, IncludeNode};
    use crate::predicate::field;
    use crate::testing::relations::*;
    use crate::testing::{Order, Product};
    use qspec_core::{ChainError, LinkShape};

    /// Records every call so tests can inspect what the plan did
    struct Recorder {
        calls: Vec<String>,
    }

    impl Recorder {
        fn new() -> Self {
            Self { calls: Vec::new() }
        }

        fn push(mut self, call: String) -> Self {
            self.calls.push(call);
            self
        }
    }

    impl<T: Entity> Queryable<T> for Recorder {
        fn with_tracking(self, mode: TrackingMode) -> Self {
            self.push(format!("tracking:{:?}", mode))
        }

        fn ignore_store_filters(self) -> Self {
            self.push("ignore_store_filters".into())
        }

        fn tag_with(self, tag: &str) -> Self {
            self.push(format!("tag:{}", tag))
        }

        fn split_fetch(self) -> Self {
            self.push("split_fetch".into())
        }

        fn filter(self, predicate: &Predicate<T>) -> Self {
            self.push(format!("filter:{}", predicate))
        }

        fn include(self, op: &IncludeOp) -> QueryResult<Self> {
            Ok(self.push(format!("include:{}", op.navigation())))
        }

        fn include_path(self, path: &str) -> QueryResult<Self> {
            Ok(self.push(format!("include_path:{}", path)))
        }

        fn group_by(self, key: &str) -> Self {
            self.push(format!("group_by:{}", key))
        }

        fn distinct(self) -> Self {
            self.push("distinct".into())
        }

        fn order_by(self, criterion: &SortCriterion) -> Self {
            self.push(format!("order_by:{}", criterion.field))
        }

        fn then_by(self, criterion: &SortCriterion) -> Self {
            self.push(format!("then_by:{}", criterion.field))
        }

        fn skip(self, count: usize) -> Self {
            self.push(format!("skip:{}", count))
        }

        fn take(self, count: usize) -> Self {
            self.push(format!("take:{}", count))
        }
    }

    fn everything() -> Specification<Order> {
        Specification::builder()
            .paginate(1, 10)
            .order_by_descending("Total")
            .then_by("Number")
            .distinct()
            .group_by("Status")
            .include_path("Items.Product")
            .include_chain(ORDER_ITEMS, |c| c.then_include(ITEM_PRODUCT))
            .include(ORDER_CUSTOMER)
            .search("ada", &["Customer.Name"])
            .and_where(field::<Order>("Total").gt(5.0))
            .where_expr(field::<Order>("Status").ne("Cancelled"))
            .split_fetch()
            .tag("orders")
            .ignore_store_filters()
            .as_no_tracking()
            .limit(99)
            .build()
            .unwrap()
    }

    #[test]
    fn test_plan_follows_fixed_order() {
        let plan = SpecificationEvaluator::compile(&everything()).unwrap();
        let steps: Vec<u8> = plan.ops().iter().map(QueryOp::step).collect();
        let mut sorted = steps.clone();
        sorted.sort();
        assert_eq!(steps, sorted);
        assert_eq!(
            plan.names(),
            vec![
                "tracking",
                "ignore_store_filters",
                "tag",
                "split_fetch",
                "filter",
                "criteria",
                "search",
                "include",
                "chain_include",
                "chain_include",
                "include_path",
                "group_by",
                "distinct",
                "order_by",
                "then_by",
                "skip",
                "take",
            ]
        );
    }

    #[test]
    fn test_apply_to_source() {
        let recorder = SpecificationEvaluator::evaluate(&everything(), Recorder::new()).unwrap();
        assert_eq!(recorder.calls[4], "filter:Status != \"Cancelled\"");
        assert_eq!(recorder.calls[6], "filter:Customer.Name contains \"ada\"");
        assert_eq!(recorder.calls[8], "include:Items");
        assert_eq!(recorder.calls[9], "include:Items.Product");
        assert_eq!(&recorder.calls[15..], &["skip:10", "take:10"]);
    }

    #[test]
    fn test_empty_specification_compiles_to_empty_plan() {
        let plan = SpecificationEvaluator::compile(&Specification::<Product>::all()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_limit_applies_without_paging() {
        let spec = Specification::<Product>::builder().limit(3).build().unwrap();
        let plan = SpecificationEvaluator::compile(&spec).unwrap();
        assert_eq!(plan.names(), vec!["limit"]);
    }

    #[test]
    fn test_limit_caps_a_skip_without_size() {
        let spec = Specification::<Product>::builder()
            .skip(2)
            .limit(3)
            .build()
            .unwrap();
        let plan = SpecificationEvaluator::compile(&spec).unwrap();
        assert_eq!(plan.names(), vec!["skip", "limit"]);
    }

    #[test]
    fn test_three_level_chain_shape() {
        let spec = Specification::<Order>::builder()
            .include_chain(ORDER_ITEMS, |items| {
                items.then_include_with(ITEM_PRODUCT, |product| product.then_include(PRODUCT_REVIEWS))
            })
            .build()
            .unwrap();

        let plan = SpecificationEvaluator::compile(&spec).unwrap();
        let shapes: Vec<_> = plan
            .ops()
            .iter()
            .filter_map(|op| match op {
                QueryOp::ChainInclude(IncludeOp::ThenInclude { shape, target_type, .. }) => {
                    Some((*shape, target_type.as_str()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            shapes,
            vec![
                (ChainShape::CollectionToReference, "Product"),
                (ChainShape::ReferenceToCollection, "Vec<Review>"),
            ]
        );
        match &plan.ops()[0] {
            QueryOp::ChainInclude(IncludeOp::Include { return_type, .. }) => {
                assert_eq!(return_type, "Vec<OrderItem>")
            }
            other => panic!("unexpected first op {:?}", other),
        }
    }

    #[test]
    fn test_broken_chain_fails_at_compile_time() {
        let mut spec = Specification::<Order>::all();
        spec.include_chains.push(
            ORDER_ITEMS
                .node()
                .with_child(IncludeNode::new("Reviews", "Product", "Review", LinkShape::Collection)),
        );
        let err = SpecificationEvaluator::compile(&spec).unwrap_err();
        assert!(matches!(err, QueryError::Chain(ChainError::OwnerMismatch { .. })));
    }
}
