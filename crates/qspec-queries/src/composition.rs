//! Predicate Specifications
//!
//! Boolean combinators over predicates alone. A [`PredicateSpec`] never
//! carries includes, orderings or paging; combining two of them only combines
//! their predicates. The full query description is
//! [`Specification`](crate::specification::Specification).

use std::marker::PhantomData;

use qspec_core::Entity;

use crate::predicate::Predicate;

/// Something that can be expressed as a predicate over `T`
pub trait PredicateSpec<T: Entity> {
    fn to_expression(&self) -> Predicate<T>;

    fn is_satisfied_by(&self, entity: &T) -> bool {
        self.to_expression().evaluate(entity)
    }
}

impl<T: Entity> PredicateSpec<T> for Predicate<T> {
    fn to_expression(&self) -> Predicate<T> {
        self.clone()
    }
}

impl<T: Entity, S: PredicateSpec<T> + ?Sized> PredicateSpec<T> for Box<S> {
    fn to_expression(&self) -> Predicate<T> {
        (**self).to_expression()
    }
}

/// A named predicate
pub struct ExprSpec<T> {
    name: &'static str,
    predicate: Predicate<T>,
}

impl<T> ExprSpec<T> {
    pub fn new(name: &'static str, predicate: Predicate<T>) -> Self {
        Self { name, predicate }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Entity> PredicateSpec<T> for ExprSpec<T> {
    fn to_expression(&self) -> Predicate<T> {
        self.predicate.clone()
    }
}

pub struct AndSpec<T, L, R> {
    left: L,
    right: R,
    _entity: PhantomData<fn(&T)>,
}

impl<T: Entity, L: PredicateSpec<T>, R: PredicateSpec<T>> PredicateSpec<T> for AndSpec<T, L, R> {
    fn to_expression(&self) -> Predicate<T> {
        self.left.to_expression().and_also(self.right.to_expression())
    }
}

pub struct OrSpec<T, L, R> {
    left: L,
    right: R,
    _entity: PhantomData<fn(&T)>,
}

impl<T: Entity, L: PredicateSpec<T>, R: PredicateSpec<T>> PredicateSpec<T> for OrSpec<T, L, R> {
    fn to_expression(&self) -> Predicate<T> {
        self.left.to_expression().or_also(self.right.to_expression())
    }
}

pub struct NotSpec<T, S> {
    inner: S,
    _entity: PhantomData<fn(&T)>,
}

impl<T: Entity, S: PredicateSpec<T>> PredicateSpec<T> for NotSpec<T, S> {
    fn to_expression(&self) -> Predicate<T> {
        self.inner.to_expression().negate()
    }
}

/// Combinator methods available on every predicate specification
pub trait PredicateSpecExt<T: Entity>: PredicateSpec<T> + Sized {
    fn and<R: PredicateSpec<T>>(self, other: R) -> AndSpec<T, Self, R> {
        AndSpec {
            left: self,
            right: other,
            _entity: PhantomData,
        }
    }

    fn or<R: PredicateSpec<T>>(self, other: R) -> OrSpec<T, Self, R> {
        OrSpec {
            left: self,
            right: other,
            _entity: PhantomData,
        }
    }

    fn not(self) -> NotSpec<T, Self> {
        NotSpec {
            inner: self,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity, S: PredicateSpec<T>> PredicateSpecExt<T> for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::field;
    use crate::testing::{catalogue, Product};

    fn featured() -> ExprSpec<Product> {
        ExprSpec::new("featured", field::<Product>("Featured").eq(true))
    }

    fn premium() -> ExprSpec<Product> {
        ExprSpec::new("premium", field::<Product>("Price").ge(100.0))
    }

    fn ids<S: PredicateSpec<Product>>(spec: &S) -> Vec<i64> {
        catalogue()
            .into_iter()
            .filter(|p| spec.is_satisfied_by(p))
            .map(|p| p.id)
            .collect()
    }

    #[test]
    fn test_and_or_not() {
        assert_eq!(ids(&featured().and(premium())), vec![1]);
        assert_eq!(ids(&featured().or(premium())), vec![1, 2, 3, 4]);
        assert_eq!(ids(&featured().not()), vec![3, 4, 5]);
    }

    #[test]
    fn test_nested_composition() {
        let spec = featured()
            .and(premium().not())
            .or(field::<Product>("Rating").gt(4.85));
        assert_eq!(ids(&spec), vec![2, 5]);
        assert_eq!(
            spec.to_expression().to_string(),
            "(Featured == true AND NOT (Price >= 100)) OR Rating > 4.85"
        );
    }

    #[test]
    fn test_boxed_specs_compose() {
        let boxed: Box<dyn PredicateSpec<Product>> = Box::new(featured());
        assert_eq!(ids(&boxed.and(premium())), vec![1]);
        assert_eq!(featured().name(), "featured");
    }

    #[test]
    fn test_predicates_compose_with_specs_both_ways() {
        let cheap = field::<Product>("Price").lt(100.0);
        assert_eq!(ids(&cheap.clone().and(featured())), vec![2]);
        assert_eq!(ids(&featured().and(cheap.clone())), vec![2]);
        assert_eq!(ids(&cheap.not()), vec![1, 3, 4]);
    }
}
