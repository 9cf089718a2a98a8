use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use bramble_types::LocalReference;

use crate::error::StoreResult;
use crate::object::ObjectContents;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access. Objects are cloned on read/write.
/// Reads are counted so tests can assert how lazily a consumer fetches.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<LocalReference, ObjectContents>>,
    reads: AtomicUsize,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            reads: AtomicUsize::new(0),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Number of `read()` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Return a sorted list of all references in the store.
    pub fn all_references(&self) -> Vec<LocalReference> {
        let map = self.objects.read().expect("lock poisoned");
        let mut references: Vec<LocalReference> = map.keys().copied().collect();
        references.sort();
        references
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, reference: &LocalReference) -> StoreResult<Option<ObjectContents>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(reference).cloned())
    }

    fn write(&self, contents: &ObjectContents) -> StoreResult<LocalReference> {
        let reference = contents.reference();
        let mut map = self.objects.write().expect("lock poisoned");
        // Idempotent: the same reference always maps to the same contents.
        map.entry(reference).or_insert_with(|| contents.clone());
        Ok(reference)
    }

    fn exists(&self, reference: &LocalReference) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(reference))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use bramble_types::ReferenceFormat;

    fn make_object(content: &[u8]) -> ObjectContents {
        ObjectContents::new(ReferenceFormat::Blake3V1, vec![], content.to_vec()).unwrap()
    }

    #[test]
    fn write_and_read() {
        let store = InMemoryObjectStore::new();
        let obj = make_object(b"hello world");
        let reference = store.write(&obj).unwrap();
        assert_eq!(reference, obj.reference());

        let read_back = store.read(&reference).unwrap().expect("should exist");
        assert_eq!(read_back, obj);
    }

    #[test]
    fn same_content_is_stored_once() {
        let store = InMemoryObjectStore::new();
        let r1 = store.write(&make_object(b"identical")).unwrap();
        let r2 = store.write(&make_object(b"identical")).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn read_missing_object_returns_none() {
        let store = InMemoryObjectStore::new();
        let reference = make_object(b"never written").reference();
        assert!(store.read(&reference).unwrap().is_none());
        assert!(!store.exists(&reference).unwrap());
    }

    #[test]
    fn get_object_reports_not_found() {
        let store = InMemoryObjectStore::new();
        let reference = make_object(b"missing").reference();
        assert!(matches!(
            store.get_object(&reference),
            Err(StoreError::NotFound(r)) if r == reference
        ));
    }

    #[test]
    fn batch_operations() {
        let store = InMemoryObjectStore::new();
        let objects = vec![make_object(b"1"), make_object(b"2"), make_object(b"3")];
        let references = store.write_batch(&objects).unwrap();
        assert_eq!(store.len(), 3);

        for (reference, object) in references.iter().zip(&objects) {
            assert_eq!(&store.get_object(reference).unwrap(), object);
        }
    }

    #[test]
    fn counts_reads() {
        let store = InMemoryObjectStore::new();
        let reference = store.write(&make_object(b"x")).unwrap();
        assert_eq!(store.read_count(), 0);
        store.read(&reference).unwrap();
        store.get_object(&reference).unwrap();
        assert_eq!(store.read_count(), 2);
    }

    #[test]
    fn all_references_are_sorted() {
        let store = InMemoryObjectStore::new();
        store.write(&make_object(b"12345")).unwrap();
        store.write(&make_object(b"123456789")).unwrap();
        let references = store.all_references();
        assert_eq!(references.len(), 2);
        assert!(references[0] <= references[1]);
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryObjectStore::new());
        let reference = store.write(&make_object(b"shared data")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let obj = store.read(&reference).unwrap().unwrap();
                    assert_eq!(obj.reference(), reference);
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    #[test]
    fn debug_format() {
        let store = InMemoryObjectStore::new();
        store.write(&make_object(b"x")).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryObjectStore"));
        assert!(debug.contains("object_count"));
    }
}
