use std::sync::Arc;

use bramble_store::{Message, ObjectReader};
use bramble_types::LocalReference;
use serde::de::DeserializeOwned;

use crate::error::BTreeResult;
use crate::node::{Node, ParentNode};

/// Resolve a parent's reference index against its containing object.
pub fn resolve_parent(parent: &Message<ParentNode>) -> BTreeResult<Option<LocalReference>> {
    Ok(Some(parent.outgoing_reference(parent.message.reference)?))
}

struct Frame<L> {
    nodes: std::vec::IntoIter<Node<L>>,
    references: Arc<[LocalReference]>,
}

/// Iterates over every leaf of a tree in order, reading parent objects
/// only when iteration reaches them.
///
/// `child_reference` decides which object a parent points at; returning
/// `Ok(None)` skips the parent's subtree entirely. Each leaf is yielded
/// together with the references of the object it was found in.
///
/// The first error is yielded once and ends the iteration. Iterating again
/// means building a new `AllLeaves` from the same root.
pub struct AllLeaves<'r, L, F> {
    reader: &'r ObjectReader,
    stack: Vec<Frame<L>>,
    child_reference: F,
    failed: bool,
}

impl<'r, L, F> AllLeaves<'r, L, F>
where
    L: DeserializeOwned,
    F: FnMut(&Message<ParentNode>) -> BTreeResult<Option<LocalReference>>,
{
    pub fn new(reader: &'r ObjectReader, root: Message<Vec<Node<L>>>, child_reference: F) -> Self {
        Self {
            reader,
            stack: vec![Frame {
                nodes: root.message.into_iter(),
                references: root.references,
            }],
            child_reference,
            failed: false,
        }
    }

    fn descend(&mut self, parent: Message<ParentNode>) -> BTreeResult<()> {
        if let Some(reference) = (self.child_reference)(&parent)? {
            let child = self.reader.read_message::<Vec<Node<L>>>(&reference)?;
            self.stack.push(Frame {
                nodes: child.message.into_iter(),
                references: child.references,
            });
        }
        Ok(())
    }
}

impl<'r, L, F> Iterator for AllLeaves<'r, L, F>
where
    L: DeserializeOwned,
    F: FnMut(&Message<ParentNode>) -> BTreeResult<Option<LocalReference>>,
{
    type Item = BTreeResult<Message<L>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let frame = self.stack.last_mut()?;
            let Some(node) = frame.nodes.next() else {
                self.stack.pop();
                continue;
            };
            let references = Arc::clone(&frame.references);
            match node {
                Node::Leaf(leaf) => return Some(Ok(Message::new(leaf, references))),
                Node::Parent(parent) => {
                    if let Err(e) = self.descend(Message::new(parent, references)) {
                        self.failed = true;
                        self.stack.clear();
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bramble_store::{
        InMemoryObjectStore, ObjectEncoding, PatchedMessage, StoringCapturer, VisitReferences,
    };
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::builder::Builder;
    use crate::error::BTreeError;
    use crate::limits::ObjectSizeLimits;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Item(u32);

    impl VisitReferences for Item {
        fn visit_references(&mut self, _visitor: &mut dyn FnMut(&mut u32)) {}
    }

    fn setup(count: u32) -> (Arc<InMemoryObjectStore>, ObjectReader, Message<Vec<Node<Item>>>) {
        let store = Arc::new(InMemoryObjectStore::new());
        let encoding = ObjectEncoding::default();
        let capturer = StoringCapturer::new(store.clone());
        let mut builder = Builder::new(ObjectSizeLimits::new(16, 64).unwrap(), &encoding, &capturer);
        for value in 0..count {
            builder
                .push_child(PatchedMessage::new(Node::Leaf(Item(value))))
                .unwrap();
        }
        let root = builder.finalize_list().unwrap();
        let (references, _) = root.patcher.into_parts();
        let reader = ObjectReader::new(store.clone(), encoding);
        (store, reader, Message::new(root.message, references.into()))
    }

    #[test]
    fn inline_root_needs_no_reads() {
        let store = Arc::new(InMemoryObjectStore::new());
        let reader = ObjectReader::new(store.clone(), ObjectEncoding::default());
        let root = Message::detached(vec![Node::Leaf(Item(1)), Node::Leaf(Item(2))]);
        let leaves: Vec<u32> = AllLeaves::new(&reader, root, resolve_parent)
            .map(|leaf| leaf.unwrap().message.0)
            .collect();
        assert_eq!(leaves, vec![1, 2]);
        assert_eq!(store.read_count(), 0);
    }

    #[test]
    fn reads_are_lazy() {
        let (store, reader, root) = setup(500);
        let mut leaves = AllLeaves::new(&reader, root, resolve_parent);
        assert_eq!(store.read_count(), 0);
        assert_eq!(leaves.next().unwrap().unwrap().message, Item(0));
        let after_first = store.read_count();
        assert!(after_first > 0);
        assert!(after_first < store.len());
    }

    #[test]
    fn iteration_is_restartable() {
        let (_, reader, root) = setup(300);
        let first: Vec<u32> = AllLeaves::new(&reader, root.clone(), resolve_parent)
            .map(|leaf| leaf.unwrap().message.0)
            .collect();
        let second: Vec<u32> = AllLeaves::new(&reader, root, resolve_parent)
            .map(|leaf| leaf.unwrap().message.0)
            .collect();
        assert_eq!(first, second);
        assert_eq!(first, (0..300).collect::<Vec<_>>());
    }

    #[test]
    fn skipped_parents_hide_their_leaves() {
        let (_, reader, root) = setup(300);
        let visible: Vec<u32> = AllLeaves::new(&reader, root, |_: &Message<ParentNode>| Ok(None))
            .map(|leaf| leaf.unwrap().message.0)
            .collect();
        assert!(visible.is_empty());
    }

    #[test]
    fn missing_object_ends_iteration() {
        let store = Arc::new(InMemoryObjectStore::new());
        let reader = ObjectReader::new(store, ObjectEncoding::default());
        let missing = LocalReference::new([9; 32], 10, 0, 0);
        let root = Message::new(
            vec![
                Node::Leaf(Item(1)),
                Node::Parent(ParentNode {
                    reference: 0,
                    count: 3,
                }),
                Node::Leaf(Item(2)),
            ],
            Arc::from(vec![missing]),
        );
        let mut leaves = AllLeaves::new(&reader, root, resolve_parent);
        assert_eq!(leaves.next().unwrap().unwrap().message, Item(1));
        assert!(matches!(leaves.next(), Some(Err(BTreeError::Store(_)))));
        assert!(leaves.next().is_none());
    }

    #[test]
    fn out_of_range_reference_index_is_an_error() {
        let store = Arc::new(InMemoryObjectStore::new());
        let reader = ObjectReader::new(store, ObjectEncoding::default());
        let root: Message<Vec<Node<Item>>> = Message::detached(vec![Node::Parent(ParentNode {
            reference: 4,
            count: 1,
        })]);
        let mut leaves = AllLeaves::new(&reader, root, resolve_parent);
        assert!(leaves.next().unwrap().is_err());
        assert!(leaves.next().is_none());
    }
}
