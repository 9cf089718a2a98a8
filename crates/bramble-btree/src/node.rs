use bramble_store::VisitReferences;
use serde::{Deserialize, Serialize};

/// Pointer from one tree level to the object holding the next level down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentNode {
    /// Index into the containing object's outgoing references.
    pub reference: u32,
    /// Number of leaves reachable through this parent, clamped to
    /// `u64::MAX`. A clamped count only means "at least this many".
    pub count: u64,
}

impl ParentNode {
    /// Whether `count` was clamped and is therefore a lower bound.
    pub fn is_saturated(&self) -> bool {
        self.count == u64::MAX
    }
}

/// One entry at some level of a tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node<L> {
    Leaf(L),
    Parent(ParentNode),
}

impl<L> Node<L> {
    /// Number of leaves this node stands for.
    pub fn leaf_count(&self) -> u64 {
        match self {
            Self::Leaf(_) => 1,
            Self::Parent(parent) => parent.count,
        }
    }

    pub fn as_leaf(&self) -> Option<&L> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Parent(_) => None,
        }
    }
}

impl<L: VisitReferences> VisitReferences for Node<L> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
        match self {
            Self::Leaf(leaf) => leaf.visit_references(visitor),
            Self::Parent(parent) => visitor(&mut parent.reference),
        }
    }
}

/// Saturating total of the leaves represented by `nodes`.
pub fn total_leaf_count<L>(nodes: &[Node<L>]) -> u64 {
    nodes
        .iter()
        .fold(0u64, |total, node| total.saturating_add(node.leaf_count()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoRefs;

    impl VisitReferences for NoRefs {
        fn visit_references(&mut self, _visitor: &mut dyn FnMut(&mut u32)) {}
    }

    #[test]
    fn leaf_count_sums() {
        let nodes = vec![
            Node::Leaf(NoRefs),
            Node::Parent(ParentNode {
                reference: 0,
                count: 5,
            }),
        ];
        assert_eq!(total_leaf_count(&nodes), 6);
    }

    #[test]
    fn leaf_count_saturates() {
        let nodes: Vec<Node<NoRefs>> = vec![
            Node::Parent(ParentNode {
                reference: 0,
                count: u64::MAX - 1,
            }),
            Node::Parent(ParentNode {
                reference: 1,
                count: 10,
            }),
        ];
        let total = total_leaf_count(&nodes);
        assert_eq!(total, u64::MAX);
        assert!(ParentNode {
            reference: 0,
            count: total
        }
        .is_saturated());
    }

    #[test]
    fn visit_parent_reference() {
        let mut node: Node<NoRefs> = Node::Parent(ParentNode {
            reference: 3,
            count: 1,
        });
        node.visit_references(&mut |index| *index += 10);
        assert_eq!(
            node,
            Node::Parent(ParentNode {
                reference: 13,
                count: 1
            })
        );
    }

    impl PartialEq for NoRefs {
        fn eq(&self, _other: &Self) -> bool {
            true
        }
    }
}
