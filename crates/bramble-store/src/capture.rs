use std::sync::Arc;

use bramble_types::LocalReference;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{CreatedObject, ObjectContents};
use crate::traits::ObjectStore;

/// Observes every object created while encoding and decides what metadata
/// travels with references to it.
///
/// The metadata of a created object is stored by whichever patcher ends up
/// referring to that object, so that once the root is written the full set
/// of new objects can be reached from it.
pub trait ObjectCapturer: Send + Sync {
    type Metadata: Send + Sync;

    /// Called once for every newly created object.
    fn capture_created_object(
        &self,
        object: CreatedObject<Self::Metadata>,
    ) -> StoreResult<Self::Metadata>;

    /// Called when a message is about to refer to an object that already
    /// exists in storage (for example a subtree of a lazily decoded list
    /// that gets encoded again).
    fn capture_existing_object(&self, reference: LocalReference) -> Self::Metadata;
}

/// Writes every created object straight to a store.
pub struct StoringCapturer<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ObjectStore + ?Sized> StoringCapturer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: ObjectStore + ?Sized> ObjectCapturer for StoringCapturer<S> {
    type Metadata = ();

    fn capture_created_object(&self, object: CreatedObject<()>) -> StoreResult<()> {
        self.store.write(&object.contents)?;
        Ok(())
    }

    fn capture_existing_object(&self, _reference: LocalReference) {}
}

/// An object that has not been written anywhere yet, with the subset of its
/// children that are in the same position. `None` children already exist in
/// storage.
#[derive(Clone, Debug)]
pub struct CreatedObjectTree {
    pub contents: ObjectContents,
    pub children: Vec<Option<Arc<CreatedObjectTree>>>,
}

/// Keeps created objects in memory as a tree, so that nothing is written
/// until the caller decides to [`upload_tree`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TreeCapturer;

impl ObjectCapturer for TreeCapturer {
    type Metadata = Option<Arc<CreatedObjectTree>>;

    fn capture_created_object(
        &self,
        object: CreatedObject<Self::Metadata>,
    ) -> StoreResult<Self::Metadata> {
        Ok(Some(Arc::new(CreatedObjectTree {
            contents: object.contents,
            children: object.metadata,
        })))
    }

    fn capture_existing_object(&self, _reference: LocalReference) -> Self::Metadata {
        None
    }
}

/// Write a tree of created objects to `store` in one batch, children first,
/// so that no object is ever stored before the objects it refers to.
pub fn upload_tree(store: &dyn ObjectStore, tree: &CreatedObjectTree) -> StoreResult<LocalReference> {
    let mut objects = Vec::new();
    collect_post_order(tree, &mut objects)?;
    let references = store.write_batch(&objects)?;
    let reference = references.last().copied().unwrap_or_else(|| tree.contents.reference());
    debug!(
        reference = %reference.short_hex(),
        objects = objects.len(),
        "uploaded object tree"
    );
    Ok(reference)
}

fn collect_post_order(tree: &CreatedObjectTree, objects: &mut Vec<ObjectContents>) -> StoreResult<()> {
    if tree.children.len() != tree.contents.references().len() {
        return Err(StoreError::CorruptObject {
            reference: tree.contents.reference(),
            reason: format!(
                "object has {} outgoing references but {} captured children",
                tree.contents.references().len(),
                tree.children.len()
            ),
        });
    }
    for child in tree.children.iter().flatten() {
        collect_post_order(child, objects)?;
    }
    objects.push(tree.contents.clone());
    Ok(())
}
