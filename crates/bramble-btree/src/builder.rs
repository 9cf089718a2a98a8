use bramble_store::{
    ObjectCapturer, ObjectContents, ObjectEncoding, PatchedMessage, ReferenceMessagePatcher,
    VisitReferences,
};
use serde::Serialize;
use tracing::debug;

use crate::chunker::ProllyChunker;
use crate::error::{BTreeError, BTreeResult};
use crate::limits::ObjectSizeLimits;
use crate::node::{total_leaf_count, Node, ParentNode};

/// Mints the node that replaces a chunk of children once that chunk has
/// been written to its own object.
pub trait ParentNodeComputer<L, M> {
    fn compute_parent_node(
        &self,
        created: &ObjectContents,
        children: &[Node<L>],
        metadata: M,
    ) -> BTreeResult<PatchedMessage<Node<L>, M>>;
}

impl<L, M, F> ParentNodeComputer<L, M> for F
where
    F: Fn(&ObjectContents, &[Node<L>], M) -> BTreeResult<PatchedMessage<Node<L>, M>>,
{
    fn compute_parent_node(
        &self,
        created: &ObjectContents,
        children: &[Node<L>],
        metadata: M,
    ) -> BTreeResult<PatchedMessage<Node<L>, M>> {
        self(created, children, metadata)
    }
}

/// Records the number of leaves below each parent, saturating at
/// `u64::MAX`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CountingParentNodeComputer;

impl<L, M> ParentNodeComputer<L, M> for CountingParentNodeComputer {
    fn compute_parent_node(
        &self,
        created: &ObjectContents,
        children: &[Node<L>],
        metadata: M,
    ) -> BTreeResult<PatchedMessage<Node<L>, M>> {
        let count = total_leaf_count(children);
        Ok(PatchedMessage::with_reference(
            created.reference(),
            metadata,
            |reference| Node::Parent(ParentNode { reference, count }),
        ))
    }
}

/// Builds a prolly tree bottom-up from a stream of leaves.
///
/// Level 0 holds the pushed leaves. Whenever the chunker of some level
/// emits a chunk, that chunk is written as an object and the parent node
/// pointing at it is pushed onto the level above.
pub struct Builder<'a, L, M, P = CountingParentNodeComputer> {
    levels: Vec<ProllyChunker<PatchedMessage<Node<L>, M>>>,
    limits: ObjectSizeLimits,
    encoding: &'a ObjectEncoding,
    capturer: &'a dyn ObjectCapturer<Metadata = M>,
    computer: P,
    objects_created: usize,
}

impl<'a, L, M> Builder<'a, L, M, CountingParentNodeComputer>
where
    L: Serialize + VisitReferences,
    M: Send + Sync,
{
    pub fn new(
        limits: ObjectSizeLimits,
        encoding: &'a ObjectEncoding,
        capturer: &'a dyn ObjectCapturer<Metadata = M>,
    ) -> Self {
        Self::with_computer(limits, encoding, capturer, CountingParentNodeComputer)
    }
}

impl<'a, L, M, P> Builder<'a, L, M, P>
where
    L: Serialize + VisitReferences,
    M: Send + Sync,
    P: ParentNodeComputer<L, M>,
{
    pub fn with_computer(
        limits: ObjectSizeLimits,
        encoding: &'a ObjectEncoding,
        capturer: &'a dyn ObjectCapturer<Metadata = M>,
        computer: P,
    ) -> Self {
        Self {
            levels: Vec::new(),
            limits,
            encoding,
            capturer,
            computer,
            objects_created: 0,
        }
    }

    /// Append a node at the bottom level. Usually a leaf, but a parent
    /// taken from an existing tree may be pushed to splice it in.
    pub fn push_child(&mut self, node: PatchedMessage<Node<L>, M>) -> BTreeResult<()> {
        self.push_at(0, node)
    }

    /// Number of objects written so far.
    pub fn objects_created(&self) -> usize {
        self.objects_created
    }

    /// Flush every level and return the root list: the pushed nodes
    /// themselves if they fit in a single chunk, otherwise the topmost
    /// level of parents.
    pub fn finalize_list(mut self) -> BTreeResult<PatchedMessage<Vec<Node<L>>, M>> {
        let mut level = 0;
        while level < self.levels.len() {
            let is_top = level + 1 == self.levels.len();
            let Some(first) = self.levels[level].pop_chunk(true) else {
                level += 1;
                continue;
            };
            if is_top && self.levels[level].is_empty() {
                debug!(
                    height = level,
                    objects = self.objects_created,
                    "finalized tree"
                );
                return Ok(merge_chunk(first));
            }
            let parent = self.create_parent(first)?;
            self.push_at(level + 1, parent)?;
            while let Some(chunk) = self.levels[level].pop_chunk(true) {
                let parent = self.create_parent(chunk)?;
                self.push_at(level + 1, parent)?;
            }
            level += 1;
        }
        Ok(PatchedMessage::new(Vec::new()))
    }

    fn push_at(&mut self, level: usize, node: PatchedMessage<Node<L>, M>) -> BTreeResult<()> {
        if level == self.levels.len() {
            let minimum_count = if level == 0 { 1 } else { 2 };
            self.levels
                .push(ProllyChunker::new(self.limits, minimum_count));
        }
        let encoded = bincode::serialize(&node.message)
            .map_err(|e| BTreeError::Serialization(e.to_string()))?;
        self.levels[level].push(node, &encoded);
        while let Some(chunk) = self.levels[level].pop_chunk(false) {
            let parent = self.create_parent(chunk)?;
            self.push_at(level + 1, parent)?;
        }
        Ok(())
    }

    fn create_parent(
        &mut self,
        chunk: Vec<PatchedMessage<Node<L>, M>>,
    ) -> BTreeResult<PatchedMessage<Node<L>, M>> {
        let PatchedMessage {
            message: children,
            patcher,
        } = merge_chunk(chunk);
        let (created, _) = self.encoding.create_object_from(&children, patcher)?;
        let contents = created.contents.clone();
        let metadata = self.capturer.capture_created_object(created)?;
        self.objects_created += 1;
        self.computer
            .compute_parent_node(&contents, &children, metadata)
    }
}

fn merge_chunk<L: VisitReferences, M>(
    chunk: Vec<PatchedMessage<Node<L>, M>>,
) -> PatchedMessage<Vec<Node<L>>, M> {
    let mut patcher = ReferenceMessagePatcher::new();
    let nodes = chunk
        .into_iter()
        .map(|node| patcher.absorb(node))
        .collect();
    PatchedMessage {
        message: nodes,
        patcher,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bramble_store::{
        InMemoryObjectStore, Message, ObjectReader, ObjectStore, StoringCapturer, TreeCapturer,
    };
    use serde::Deserialize;

    use super::*;
    use crate::leaves::{resolve_parent, AllLeaves};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Item(u64);

    impl VisitReferences for Item {
        fn visit_references(&mut self, _visitor: &mut dyn FnMut(&mut u32)) {}
    }

    fn leaf(value: u64) -> PatchedMessage<Node<Item>, ()> {
        PatchedMessage::new(Node::Leaf(Item(value)))
    }

    fn build(
        store: &Arc<InMemoryObjectStore>,
        limits: ObjectSizeLimits,
        values: impl IntoIterator<Item = u64>,
    ) -> PatchedMessage<Vec<Node<Item>>, ()> {
        let encoding = ObjectEncoding::default();
        let capturer = StoringCapturer::new(store.clone());
        let mut builder = Builder::new(limits, &encoding, &capturer);
        for value in values {
            builder.push_child(leaf(value)).unwrap();
        }
        builder.finalize_list().unwrap()
    }

    fn read_back(store: &Arc<InMemoryObjectStore>, root: PatchedMessage<Vec<Node<Item>>, ()>) -> Vec<u64> {
        let reader = ObjectReader::new(store.clone(), ObjectEncoding::default());
        let (references, _) = root.patcher.into_parts();
        let root = Message::new(root.message, references.into());
        AllLeaves::new(&reader, root, resolve_parent)
            .map(|leaf| leaf.unwrap().message.0)
            .collect()
    }

    // ---- Shape ----

    #[test]
    fn empty_builder_yields_empty_list() {
        let store = Arc::new(InMemoryObjectStore::new());
        let root = build(&store, ObjectSizeLimits::default(), []);
        assert!(root.message.is_empty());
        assert!(root.patcher.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn small_list_stays_inline() {
        let store = Arc::new(InMemoryObjectStore::new());
        let root = build(&store, ObjectSizeLimits::default(), 0..10);
        assert_eq!(root.message.len(), 10);
        assert!(root.message.iter().all(|node| node.as_leaf().is_some()));
        assert!(store.is_empty());
    }

    #[test]
    fn large_list_is_split_into_objects() {
        let store = Arc::new(InMemoryObjectStore::new());
        let limits = ObjectSizeLimits::new(64, 256).unwrap();
        let root = build(&store, limits, 0..5000);
        assert!(!store.is_empty());
        assert!(root
            .message
            .iter()
            .all(|node| matches!(node, Node::Parent(_))));
        let encoded = bincode::serialize(&root.message).unwrap();
        assert!(encoded.len() <= limits.maximum_size_bytes * 2);
        assert_eq!(total_leaf_count(&root.message), 5000);
        assert_eq!(read_back(&store, root), (0..5000).collect::<Vec<_>>());
    }

    #[test]
    fn stored_objects_respect_maximum_size() {
        let store = Arc::new(InMemoryObjectStore::new());
        let limits = ObjectSizeLimits::new(32, 128).unwrap();
        build(&store, limits, 0..2000);
        for reference in store.all_references() {
            let contents = store.read(&reference).unwrap().unwrap();
            // Vec length prefix, plus one parent node when a cut would
            // have left a single node behind.
            assert!(contents.data().len() <= limits.maximum_size_bytes + 8 + 16);
        }
    }

    #[test]
    fn identical_input_builds_identical_trees() {
        let limits = ObjectSizeLimits::new(64, 256).unwrap();
        let a = Arc::new(InMemoryObjectStore::new());
        let b = Arc::new(InMemoryObjectStore::new());
        let root_a = build(&a, limits, 0..3000);
        let root_b = build(&b, limits, 0..3000);
        assert_eq!(root_a.message, root_b.message);
        assert_eq!(
            root_a.patcher.references().collect::<Vec<_>>(),
            root_b.patcher.references().collect::<Vec<_>>()
        );
        assert_eq!(a.len(), b.len());
    }

    // ---- Parent computation ----

    #[test]
    fn custom_parent_computer_is_used() {
        let store = Arc::new(InMemoryObjectStore::new());
        let encoding = ObjectEncoding::default();
        let capturer = StoringCapturer::new(store.clone());
        let computer = |created: &ObjectContents, _: &[Node<Item>], metadata: ()| {
            Ok::<_, BTreeError>(PatchedMessage::with_reference(
                created.reference(),
                metadata,
                |reference| {
                    Node::Parent(ParentNode {
                        reference,
                        count: 0,
                    })
                },
            ))
        };
        let mut builder = Builder::with_computer(
            ObjectSizeLimits::new(16, 64).unwrap(),
            &encoding,
            &capturer,
            computer,
        );
        for value in 0..500 {
            builder.push_child(leaf(value)).unwrap();
        }
        assert!(builder.objects_created() > 0);
        let root = builder.finalize_list().unwrap();
        assert_eq!(total_leaf_count(&root.message), 0);
    }

    #[test]
    fn tree_capturer_defers_writes() {
        let encoding = ObjectEncoding::default();
        let capturer = TreeCapturer;
        let mut builder = Builder::new(ObjectSizeLimits::new(16, 64).unwrap(), &encoding, &capturer);
        for value in 0..300 {
            builder
                .push_child(PatchedMessage::new(Node::Leaf(Item(value))))
                .unwrap();
        }
        let root = builder.finalize_list().unwrap();
        let (references, metadata) = root.patcher.into_parts();
        assert!(!references.is_empty());

        let store = Arc::new(InMemoryObjectStore::new());
        for tree in metadata.iter().flatten() {
            bramble_store::upload_tree(store.as_ref(), tree).unwrap();
        }
        let root = Message::new(root.message, references.into());
        let reader = ObjectReader::new(store, encoding.clone());
        let values: Vec<u64> = AllLeaves::new(&reader, root, resolve_parent)
            .map(|leaf| leaf.unwrap().message.0)
            .collect();
        assert_eq!(values, (0..300).collect::<Vec<_>>());
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn leaves_round_trip(
                values in proptest::collection::vec(any::<u64>(), 0..600),
                minimum in 0usize..64,
                spread in 16usize..256,
            ) {
                let store = Arc::new(InMemoryObjectStore::new());
                let limits = ObjectSizeLimits::new(minimum, minimum + spread).unwrap();
                let root = build(&store, limits, values.clone());
                prop_assert_eq!(read_back(&store, root), values);
            }
        }
    }
}
