use std::sync::Arc;

use bramble_types::{DecodableReference, LocalReference};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectEncoding;
use crate::traits::ObjectStore;

/// A message decoded from an object, along with the outgoing references
/// its reference indices resolve against.
#[derive(Clone, Debug)]
pub struct Message<T> {
    pub message: T,
    pub references: Arc<[LocalReference]>,
}

impl<T> Message<T> {
    pub fn new(message: T, references: Arc<[LocalReference]>) -> Self {
        Self {
            message,
            references,
        }
    }

    /// A message that is not stored in any object and has no references.
    pub fn detached(message: T) -> Self {
        Self {
            message,
            references: Arc::from(Vec::new()),
        }
    }

    /// Resolve a reference index embedded in the message.
    pub fn outgoing_reference(&self, index: u32) -> StoreResult<LocalReference> {
        self.references
            .get(index as usize)
            .copied()
            .ok_or(StoreError::ReferenceIndexOutOfBounds {
                index,
                degree: self.references.len(),
            })
    }

    /// Pair a nested part of this message with the same references.
    pub fn with<U>(&self, message: U) -> Message<U> {
        Message {
            message,
            references: Arc::clone(&self.references),
        }
    }
}

/// Typed reader over an [`ObjectStore`].
///
/// Every read verifies that the object hashes to the requested reference
/// before decoding it.
#[derive(Clone)]
pub struct ObjectReader {
    store: Arc<dyn ObjectStore>,
    encoding: ObjectEncoding,
}

impl ObjectReader {
    pub fn new(store: Arc<dyn ObjectStore>, encoding: ObjectEncoding) -> Self {
        Self { store, encoding }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Read and decode an object created with empty decoding parameters.
    pub fn read_message<T: DeserializeOwned>(
        &self,
        reference: &LocalReference,
    ) -> StoreResult<Message<T>> {
        self.read_decodable(&DecodableReference::new(*reference, Vec::new()))
    }

    /// Read and decode an object using the parameters carried by `reference`.
    pub fn read_decodable<T: DeserializeOwned>(
        &self,
        reference: &DecodableReference,
    ) -> StoreResult<Message<T>> {
        let contents = self.store.get_object(&reference.reference)?;
        contents.verify(self.encoding.format, &reference.reference)?;
        let message = self
            .encoding
            .decode_message(&contents, &reference.decoding_parameters)?;
        debug!(reference = %reference.reference.short_hex(), "read object");
        Ok(Message::new(message, Arc::clone(contents.references())))
    }
}

impl std::fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}
