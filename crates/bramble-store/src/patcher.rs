use std::collections::HashMap;

use bramble_types::LocalReference;

/// Messages that embed outgoing reference indices.
///
/// Implementations call `visitor` once for every reference index the
/// message contains, including those of nested messages, so the indices can
/// be rewritten when patchers are merged.
pub trait VisitReferences {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32));
}

impl<T: VisitReferences> VisitReferences for Vec<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
        for element in self {
            element.visit_references(visitor);
        }
    }
}

impl<T: VisitReferences> VisitReferences for Option<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
        if let Some(inner) = self {
            inner.visit_references(visitor);
        }
    }
}

impl<T: VisitReferences> VisitReferences for Box<T> {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
        (**self).visit_references(visitor);
    }
}

/// Tracks the outgoing references of a message that has not been written
/// to an object yet, together with capturer metadata for each of them.
///
/// Adding the same reference twice yields the same index.
#[derive(Debug)]
pub struct ReferenceMessagePatcher<M> {
    references: Vec<(LocalReference, M)>,
    indices: HashMap<LocalReference, u32>,
}

impl<M> Default for ReferenceMessagePatcher<M> {
    fn default() -> Self {
        Self {
            references: Vec::new(),
            indices: HashMap::new(),
        }
    }
}

impl<M> ReferenceMessagePatcher<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outgoing reference, returning the index to embed in the
    /// message.
    pub fn add_reference(&mut self, reference: LocalReference, metadata: M) -> u32 {
        if let Some(&index) = self.indices.get(&reference) {
            return index;
        }
        let index = self.references.len() as u32;
        self.references.push((reference, metadata));
        self.indices.insert(reference, index);
        index
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// The references recorded so far, in index order.
    pub fn references(&self) -> impl Iterator<Item = &LocalReference> {
        self.references.iter().map(|(reference, _)| reference)
    }

    /// Merge another patched message into this patcher, returning the
    /// message with its reference indices rewritten to point into `self`.
    pub fn absorb<T: VisitReferences>(&mut self, other: PatchedMessage<T, M>) -> T {
        let PatchedMessage {
            mut message,
            patcher,
        } = other;
        if patcher.is_empty() {
            return message;
        }
        let remap: Vec<u32> = patcher
            .references
            .into_iter()
            .map(|(reference, metadata)| self.add_reference(reference, metadata))
            .collect();
        message.visit_references(&mut |index| {
            *index = remap[*index as usize];
        });
        message
    }

    /// Split into the references and their metadata, both in index order.
    pub fn into_parts(self) -> (Vec<LocalReference>, Vec<M>) {
        self.references.into_iter().unzip()
    }
}

/// A message paired with the patcher that owns its outgoing references.
///
/// A patched message must end up in exactly one object: either written via
/// [`ObjectEncoding::create_object`](crate::ObjectEncoding::create_object)
/// or absorbed into another patcher. Both consume it.
#[derive(Debug)]
pub struct PatchedMessage<T, M> {
    pub message: T,
    pub patcher: ReferenceMessagePatcher<M>,
}

impl<T, M> PatchedMessage<T, M> {
    /// A message without outgoing references.
    pub fn new(message: T) -> Self {
        Self {
            message,
            patcher: ReferenceMessagePatcher::new(),
        }
    }

    /// A message that refers to a single object.
    pub fn with_reference(
        reference: LocalReference,
        metadata: M,
        build: impl FnOnce(u32) -> T,
    ) -> Self {
        let mut patcher = ReferenceMessagePatcher::new();
        let index = patcher.add_reference(reference, metadata);
        Self {
            message: build(index),
            patcher,
        }
    }

    /// Transform the message while keeping its patcher.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PatchedMessage<U, M> {
        PatchedMessage {
            message: f(self.message),
            patcher: self.patcher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Refs(Vec<u32>);

    impl VisitReferences for Refs {
        fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
            for index in &mut self.0 {
                visitor(index);
            }
        }
    }

    fn reference(seed: u8) -> LocalReference {
        LocalReference::new([seed; 32], 1, 0, 0)
    }

    #[test]
    fn add_reference_deduplicates() {
        let mut patcher = ReferenceMessagePatcher::new();
        assert_eq!(patcher.add_reference(reference(1), "a"), 0);
        assert_eq!(patcher.add_reference(reference(2), "b"), 1);
        assert_eq!(patcher.add_reference(reference(1), "c"), 0);
        assert_eq!(patcher.len(), 2);
        let (references, metadata) = patcher.into_parts();
        assert_eq!(references, vec![reference(1), reference(2)]);
        assert_eq!(metadata, vec!["a", "b"]);
    }

    #[test]
    fn absorb_remaps_indices() {
        let mut target: PatchedMessage<Refs, ()> = PatchedMessage::new(Refs(vec![]));
        let first = target.patcher.add_reference(reference(1), ());
        target.message.0.push(first);

        let mut other = PatchedMessage::new(Refs(vec![]));
        let a = other.patcher.add_reference(reference(2), ());
        let b = other.patcher.add_reference(reference(1), ());
        other.message.0.extend([a, b]);

        let absorbed = target.patcher.absorb(other);
        assert_eq!(absorbed, Refs(vec![1, 0]));
        assert_eq!(target.patcher.len(), 2);
    }

    #[test]
    fn absorb_without_references_is_identity() {
        let mut target: ReferenceMessagePatcher<()> = ReferenceMessagePatcher::new();
        target.add_reference(reference(9), ());
        let absorbed = target.absorb(PatchedMessage::new(Refs(vec![])));
        assert_eq!(absorbed, Refs(vec![]));
    }

    #[test]
    fn with_reference_builds_message() {
        let patched: PatchedMessage<Refs, ()> =
            PatchedMessage::with_reference(reference(3), (), |i| Refs(vec![i]));
        assert_eq!(patched.message, Refs(vec![0]));
        assert_eq!(patched.patcher.references().copied().collect::<Vec<_>>(), vec![reference(3)]);
    }

    #[test]
    fn map_keeps_patcher() {
        let patched: PatchedMessage<u32, ()> =
            PatchedMessage::with_reference(reference(3), (), |i| i);
        let mapped = patched.map(|i| Refs(vec![i]));
        assert_eq!(mapped.patcher.len(), 1);
    }
}
