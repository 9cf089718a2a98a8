use bramble_types::LocalReference;

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectContents;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees this:
///   the same contents always produce the same reference.
/// - Concurrent reads are always safe (objects are immutable).
/// - The store never interprets object contents; it is a pure key-value store.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by reference.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn read(&self, reference: &LocalReference) -> StoreResult<Option<ObjectContents>>;

    /// Write an object and return its reference.
    ///
    /// If the object already exists, this is a no-op (idempotent).
    fn write(&self, contents: &ObjectContents) -> StoreResult<LocalReference>;

    /// Check whether an object exists in the store.
    fn exists(&self, reference: &LocalReference) -> StoreResult<bool>;

    /// Read an object that is required to exist.
    fn get_object(&self, reference: &LocalReference) -> StoreResult<ObjectContents> {
        self.read(reference)?
            .ok_or(StoreError::NotFound(*reference))
    }

    /// Write multiple objects in a batch and return their references, in
    /// order. Backends may override this to save round-trips.
    fn write_batch(&self, objects: &[ObjectContents]) -> StoreResult<Vec<LocalReference>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }
}
