//! Eager-load Chains
//!
//! Related data is attached through include paths. A path is a forest of
//! [`IncludeNode`]s: every root is a top-level include, every child a
//! then-include continuation of its parent.
//!
//! The operation issued for a continuation depends on two things: whether the
//! parent link yields a collection (which changes the input shape the
//! continuation starts from) and the child's own return type. The element
//! type of a collection link is never used as the return type of the link
//! itself; `Vec<OrderItem>` and `OrderItem` are different shapes.

use std::fmt;
use std::marker::PhantomData;

use qspec_core::{ChainError, Entity, LinkShape};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Chains deeper than this are rejected
pub const MAX_CHAIN_DEPTH: usize = 8;

/// A typed navigation from `Owner` to `Target`
pub struct Relation<Owner, Target> {
    name: &'static str,
    shape: LinkShape,
    _link: PhantomData<fn(&Owner) -> Target>,
}

impl<Owner, Target> Relation<Owner, Target> {
    pub const fn reference(name: &'static str) -> Self {
        Self {
            name,
            shape: LinkShape::Reference,
            _link: PhantomData,
        }
    }

    pub const fn collection(name: &'static str) -> Self {
        Self {
            name,
            shape: LinkShape::Collection,
            _link: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> LinkShape {
        self.shape
    }
}

impl<Owner: Entity, Target: Entity> Relation<Owner, Target> {
    /// A fresh, childless node for this link
    pub fn node(&self) -> IncludeNode {
        IncludeNode::new(self.name, Owner::type_name(), Target::type_name(), self.shape)
    }

    /// Whether the owner's schema declares this navigation
    pub fn is_declared(&self) -> bool {
        Owner::schema()
            .relation(self.name)
            .is_some_and(|r| r.shape == self.shape && r.target_schema().name == Target::type_name())
    }
}

impl<Owner, Target> Clone for Relation<Owner, Target> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Owner, Target> Copy for Relation<Owner, Target> {}

impl<Owner, Target> fmt::Debug for Relation<Owner, Target> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// One link of an eager-load path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeNode {
    /// Navigation name on the owner
    pub path: String,
    pub owner_type: String,
    /// Element type for collections, the related type otherwise
    pub target_type: String,
    /// The link's own return type (`Vec<Element>` for collections)
    pub return_type: String,
    pub shape: LinkShape,
    #[serde(default)]
    pub children: Vec<IncludeNode>,
}

impl IncludeNode {
    pub fn new(path: &str, owner_type: &str, target_type: &str, shape: LinkShape) -> Self {
        Self {
            path: path.to_string(),
            owner_type: owner_type.to_string(),
            target_type: target_type.to_string(),
            return_type: shape.return_type(target_type),
            shape,
            children: Vec::new(),
        }
    }

    pub fn is_collection_link(&self) -> bool {
        self.shape.is_collection()
    }

    pub fn with_child(mut self, child: IncludeNode) -> Self {
        self.children.push(child);
        self
    }

    /// Depth of the deepest path below and including this node
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(IncludeNode::depth).max().unwrap_or(0)
    }

    /// Every root-to-leaf navigation path, e.g. `Items.Product.Reviews`
    pub fn paths(&self) -> Vec<String> {
        if self.children.is_empty() {
            return vec![self.path.clone()];
        }
        self.children
            .iter()
            .flat_map(|c| c.paths())
            .map(|p| format!("{}.{}", self.path, p))
            .collect()
    }
}

/// Fluent continuation of a chain whose current element type is `T`
pub struct ChainBuilder<T> {
    node: IncludeNode,
    undeclared: Vec<String>,
    _element: PhantomData<fn() -> T>,
}

impl<T: Entity> ChainBuilder<T> {
    pub(crate) fn start<Owner: Entity>(relation: Relation<Owner, T>) -> Self {
        let mut undeclared = Vec::new();
        if !relation.is_declared() {
            undeclared.push(format!("{}.{}", Owner::type_name(), relation.name()));
        }
        Self {
            node: relation.node(),
            undeclared,
            _element: PhantomData,
        }
    }

    /// Continue the chain with a leaf link
    pub fn then_include<N: Entity>(self, relation: Relation<T, N>) -> Self {
        self.then_include_with(relation, |chain| chain)
    }

    /// Continue the chain and keep building below the new link
    pub fn then_include_with<N, F>(mut self, relation: Relation<T, N>, build: F) -> Self
    where
        N: Entity,
        F: FnOnce(ChainBuilder<N>) -> ChainBuilder<N>,
    {
        let (child, undeclared) = build(ChainBuilder::start(relation)).finish();
        self.undeclared.extend(undeclared);
        self.node.children.push(child);
        self
    }

    /// The finished node plus any links the schemas do not declare
    pub(crate) fn finish(self) -> (IncludeNode, Vec<String>) {
        (self.node, self.undeclared)
    }
}

/// Structural variant of a then-include, keyed by
/// (parent link is a collection, child link shape)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainShape {
    ReferenceToReference,
    ReferenceToCollection,
    CollectionToReference,
    CollectionToCollection,
}

const CHAIN_SHAPES: [(bool, LinkShape, ChainShape); 4] = [
    (false, LinkShape::Reference, ChainShape::ReferenceToReference),
    (false, LinkShape::Collection, ChainShape::ReferenceToCollection),
    (true, LinkShape::Reference, ChainShape::CollectionToReference),
    (true, LinkShape::Collection, ChainShape::CollectionToCollection),
];

impl ChainShape {
    /// Look up the continuation shape for a parent/child pair
    pub fn lookup(parent_is_collection: bool, child: LinkShape) -> Option<Self> {
        CHAIN_SHAPES
            .iter()
            .find(|(p, c, _)| *p == parent_is_collection && *c == child)
            .map(|(_, _, shape)| *shape)
    }

    pub fn parent_is_collection(&self) -> bool {
        matches!(
            self,
            ChainShape::CollectionToReference | ChainShape::CollectionToCollection
        )
    }

    pub fn child_shape(&self) -> LinkShape {
        match self {
            ChainShape::ReferenceToReference | ChainShape::CollectionToReference => {
                LinkShape::Reference
            }
            ChainShape::ReferenceToCollection | ChainShape::CollectionToCollection => {
                LinkShape::Collection
            }
        }
    }
}

/// A resolved include operation, ready to be applied to a queryable source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IncludeOp {
    /// Attach a top-level link
    #[serde(rename_all = "camelCase")]
    Include {
        path: String,
        /// The link's return type, not its element type
        return_type: String,
        shape: LinkShape,
    },
    /// Continue the chain below `parent_path`
    #[serde(rename_all = "camelCase")]
    ThenInclude {
        /// Dotted navigation path of the parent link, from the root
        parent_path: String,
        path: String,
        shape: ChainShape,
        /// The child's own return type
        target_type: String,
    },
}

impl IncludeOp {
    /// Full dotted navigation path of the link this operation attaches
    pub fn navigation(&self) -> String {
        match self {
            IncludeOp::Include { path, .. } => path.clone(),
            IncludeOp::ThenInclude {
                parent_path, path, ..
            } => format!("{}.{}", parent_path, path),
        }
    }
}

/// Resolve a simple single-level include
pub fn resolve_include(node: &IncludeNode) -> Result<IncludeOp, ChainError> {
    check_return_type(node)?;
    Ok(IncludeOp::Include {
        path: node.path.clone(),
        return_type: node.return_type.clone(),
        shape: node.shape,
    })
}

/// Resolve a whole chain tree into include operations, depth first
pub fn resolve_chain(root: &IncludeNode) -> Result<Vec<IncludeOp>, ChainError> {
    if root.depth() > MAX_CHAIN_DEPTH {
        return Err(ChainError::UnsupportedShape {
            path: root.path.clone(),
            detail: format!("chain deeper than {} links", MAX_CHAIN_DEPTH),
        });
    }

    let mut ops = vec![resolve_include(root)?];
    for child in &root.children {
        resolve_continuation(root, &root.path, child, &mut ops)?;
    }
    trace!(root = %root.path, operations = ops.len(), "Include chain resolved");
    Ok(ops)
}

fn resolve_continuation(
    parent: &IncludeNode,
    parent_path: &str,
    child: &IncludeNode,
    ops: &mut Vec<IncludeOp>,
) -> Result<(), ChainError> {
    if child.owner_type != parent.target_type {
        return Err(ChainError::OwnerMismatch {
            path: format!("{}.{}", parent_path, child.path),
            expected: parent.target_type.clone(),
            found: child.owner_type.clone(),
        });
    }
    check_return_type(child)?;

    let shape = ChainShape::lookup(parent.is_collection_link(), child.shape).ok_or_else(|| {
        ChainError::UnsupportedShape {
            path: format!("{}.{}", parent_path, child.path),
            detail: format!("{:?} below {:?}", child.shape, parent.shape),
        }
    })?;

    ops.push(IncludeOp::ThenInclude {
        parent_path: parent_path.to_string(),
        path: child.path.clone(),
        shape,
        target_type: child.return_type.clone(),
    });

    let child_path = format!("{}.{}", parent_path, child.path);
    for grandchild in &child.children {
        resolve_continuation(child, &child_path, grandchild, ops)?;
    }
    Ok(())
}

fn check_return_type(node: &IncludeNode) -> Result<(), ChainError> {
    let expected = node.shape.return_type(&node.target_type);
    if node.return_type != expected {
        return Err(ChainError::UnsupportedShape {
            path: node.path.clone(),
            detail: format!(
                "return type {} does not match a {:?} of {}",
                node.return_type, node.shape, node.target_type
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::relations::*;
    use crate::testing::{Order, Product};

    fn order_items_product() -> IncludeNode {
        let (node, undeclared) = ChainBuilder::start(ORDER_ITEMS)
            .then_include(ITEM_PRODUCT)
            .finish();
        assert!(undeclared.is_empty());
        node
    }

    #[test]
    fn test_chain_shape_table() {
        assert_eq!(
            ChainShape::lookup(true, LinkShape::Reference),
            Some(ChainShape::CollectionToReference)
        );
        assert_eq!(
            ChainShape::lookup(false, LinkShape::Collection),
            Some(ChainShape::ReferenceToCollection)
        );
        for (p, c, shape) in CHAIN_SHAPES {
            assert_eq!(shape.parent_is_collection(), p);
            assert_eq!(shape.child_shape(), c);
        }
    }

    #[test]
    fn test_root_uses_link_return_type() {
        let node = ORDER_ITEMS.node();
        assert_eq!(node.target_type, "OrderItem");
        assert_eq!(node.return_type, "Vec<OrderItem>");

        match resolve_include(&node).unwrap() {
            IncludeOp::Include { return_type, shape, .. } => {
                assert_eq!(return_type, "Vec<OrderItem>");
                assert_eq!(shape, LinkShape::Collection);
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_three_level_chain_sees_collection_parent() {
        let ops = resolve_chain(&order_items_product()).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[1],
            IncludeOp::ThenInclude {
                parent_path: "Items".into(),
                path: "Product".into(),
                shape: ChainShape::CollectionToReference,
                target_type: "Product".into(),
            }
        );
    }

    #[test]
    fn test_grandchild_continuation_uses_child_return_type() {
        let (node, _) = ChainBuilder::start(ORDER_ITEMS)
            .then_include_with(ITEM_PRODUCT, |c| c.then_include(PRODUCT_REVIEWS))
            .finish();
        let ops = resolve_chain(&node).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[2],
            IncludeOp::ThenInclude {
                parent_path: "Items.Product".into(),
                path: "Reviews".into(),
                shape: ChainShape::ReferenceToCollection,
                target_type: "Vec<Review>".into(),
            }
        );
        assert_eq!(ops[2].navigation(), "Items.Product.Reviews");
        assert_eq!(node.paths(), vec!["Items.Product.Reviews"]);
    }

    #[test]
    fn test_owner_mismatch_is_a_compile_error() {
        let broken = ORDER_ITEMS
            .node()
            .with_child(IncludeNode::new("Reviews", "Product", "Review", LinkShape::Collection));
        let err = resolve_chain(&broken).unwrap_err();
        assert!(matches!(err, ChainError::OwnerMismatch { ref expected, .. } if expected == "OrderItem"));
    }

    #[test]
    fn test_inconsistent_return_type_is_rejected() {
        let mut node = ORDER_ITEMS.node();
        node.return_type = "OrderItem".into();
        assert!(matches!(
            resolve_chain(&node),
            Err(ChainError::UnsupportedShape { .. })
        ));
    }

    #[test]
    fn test_overly_deep_chain_is_rejected() {
        let mut node = IncludeNode::new("Parent", "Node", "Node", LinkShape::Reference);
        for _ in 0..MAX_CHAIN_DEPTH {
            node = IncludeNode::new("Parent", "Node", "Node", LinkShape::Reference).with_child(node);
        }
        assert!(resolve_chain(&node).is_err());
    }

    #[test]
    fn test_undeclared_relation_is_reported() {
        const BOGUS: Relation<Order, Product> = Relation::reference("Bogus");
        let (_, undeclared) = ChainBuilder::start(BOGUS).finish();
        assert_eq!(undeclared, vec!["Order.Bogus".to_string()]);
    }
}
