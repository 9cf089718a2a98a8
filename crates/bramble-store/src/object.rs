use std::sync::Arc;

use bramble_crypto::ContentHasher;
use bramble_types::{LocalReference, ReferenceFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::encoder::{BinaryEncoder, IdentityEncoder};
use crate::error::{StoreError, StoreResult};
use crate::patcher::{PatchedMessage, ReferenceMessagePatcher};

/// The contents of a stored object: encoded data plus outgoing references.
///
/// `ObjectContents` is the unit of storage. The store never interprets the
/// data; it only keys the object by its reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectContents {
    reference: LocalReference,
    references: Arc<[LocalReference]>,
    data: Vec<u8>,
}

impl ObjectContents {
    /// Create object contents and compute their reference.
    pub fn new(
        format: ReferenceFormat,
        references: Vec<LocalReference>,
        data: Vec<u8>,
    ) -> StoreResult<Self> {
        let size_bytes =
            u32::try_from(data.len()).map_err(|_| StoreError::ObjectTooLarge(data.len()))?;
        let degree = u16::try_from(references.len())
            .map_err(|_| StoreError::TooManyReferences(references.len()))?;
        let height = match references.iter().map(LocalReference::height).max() {
            None => 0,
            Some(h) => h.checked_add(1).ok_or(StoreError::HeightOverflow)?,
        };
        let hash = ContentHasher::for_format(format).hash_object(&references, &data);
        Ok(Self {
            reference: LocalReference::new(hash, size_bytes, height, degree),
            references: references.into(),
            data,
        })
    }

    /// The content-addressed reference of this object.
    pub fn reference(&self) -> LocalReference {
        self.reference
    }

    /// All outgoing references, in index order.
    pub fn references(&self) -> &Arc<[LocalReference]> {
        &self.references
    }

    /// Resolve an outgoing reference index stored in this object's data.
    pub fn outgoing_reference(&self, index: u32) -> StoreResult<LocalReference> {
        self.references
            .get(index as usize)
            .copied()
            .ok_or(StoreError::ReferenceIndexOutOfBounds {
                index,
                degree: self.references.len(),
            })
    }

    /// The encoded data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Recompute the reference under `format` and compare it with `expected`.
    pub fn verify(&self, format: ReferenceFormat, expected: &LocalReference) -> StoreResult<()> {
        let recomputed = Self::new(format, self.references.to_vec(), self.data.clone())?;
        if recomputed.reference != *expected {
            return Err(StoreError::ReferenceMismatch {
                expected: *expected,
                actual: recomputed.reference,
            });
        }
        Ok(())
    }
}

/// A freshly created object, together with the capturer metadata of each of
/// its outgoing references (same order as [`ObjectContents::references`]).
#[derive(Clone, Debug)]
pub struct CreatedObject<M> {
    pub contents: ObjectContents,
    pub metadata: Vec<M>,
}

/// How new objects are encoded: which reference format to hash with and
/// which binary encoder to apply to serialized messages.
#[derive(Clone, Debug)]
pub struct ObjectEncoding {
    pub format: ReferenceFormat,
    pub encoder: Arc<dyn BinaryEncoder>,
}

impl Default for ObjectEncoding {
    fn default() -> Self {
        Self {
            format: ReferenceFormat::default(),
            encoder: Arc::new(IdentityEncoder),
        }
    }
}

impl ObjectEncoding {
    pub fn new(format: ReferenceFormat, encoder: Arc<dyn BinaryEncoder>) -> Self {
        Self { format, encoder }
    }

    /// Serialize a patched message into a new object.
    ///
    /// Consumes the patcher: its references become the object's outgoing
    /// references and its metadata is handed back alongside the contents.
    /// Returns the decoding parameters needed to read the object back.
    pub fn create_object<T: Serialize, M>(
        &self,
        message: PatchedMessage<T, M>,
    ) -> StoreResult<(CreatedObject<M>, Vec<u8>)> {
        let PatchedMessage { message, patcher } = message;
        self.create_object_from(&message, patcher)
    }

    /// Like [`create_object`](Self::create_object), but leaves the message
    /// with the caller.
    pub fn create_object_from<T: Serialize, M>(
        &self,
        message: &T,
        patcher: ReferenceMessagePatcher<M>,
    ) -> StoreResult<(CreatedObject<M>, Vec<u8>)> {
        let serialized =
            bincode::serialize(message).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let (data, decoding_parameters) = self.encoder.encode_binary(&serialized)?;
        let (references, metadata) = patcher.into_parts();
        let contents = ObjectContents::new(self.format, references, data)?;
        debug!(
            reference = %contents.reference().short_hex(),
            size = contents.data().len(),
            degree = contents.references().len(),
            "created object"
        );
        Ok((CreatedObject { contents, metadata }, decoding_parameters))
    }

    /// Reverse [`create_object`](Self::create_object): decode and
    /// deserialize an object's data.
    pub fn decode_message<T: DeserializeOwned>(
        &self,
        contents: &ObjectContents,
        decoding_parameters: &[u8],
    ) -> StoreResult<T> {
        let serialized = self
            .encoder
            .decode_binary(contents.data(), decoding_parameters)?;
        bincode::deserialize(&serialized).map_err(|e| StoreError::CorruptObject {
            reference: contents.reference(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ZstdEncoder;

    fn leaf(data: &[u8]) -> ObjectContents {
        ObjectContents::new(ReferenceFormat::Blake3V1, vec![], data.to_vec()).unwrap()
    }

    #[test]
    fn leaf_object_has_height_zero() {
        let obj = leaf(b"hello");
        assert_eq!(obj.reference().height(), 0);
        assert_eq!(obj.reference().degree(), 0);
        assert_eq!(obj.reference().size_bytes(), 5);
    }

    #[test]
    fn parent_height_is_one_above_tallest_child() {
        let a = leaf(b"a");
        let b = ObjectContents::new(ReferenceFormat::Blake3V1, vec![a.reference()], b"b".to_vec())
            .unwrap();
        let c = ObjectContents::new(
            ReferenceFormat::Blake3V1,
            vec![a.reference(), b.reference()],
            b"c".to_vec(),
        )
        .unwrap();
        assert_eq!(b.reference().height(), 1);
        assert_eq!(c.reference().height(), 2);
        assert_eq!(c.reference().degree(), 2);
    }

    #[test]
    fn same_content_same_reference() {
        assert_eq!(leaf(b"x").reference(), leaf(b"x").reference());
        assert_ne!(leaf(b"x").reference(), leaf(b"y").reference());
    }

    #[test]
    fn outgoing_reference_is_bounds_checked() {
        let a = leaf(b"a");
        let b = ObjectContents::new(ReferenceFormat::Blake3V1, vec![a.reference()], vec![]).unwrap();
        assert_eq!(b.outgoing_reference(0).unwrap(), a.reference());
        assert!(matches!(
            b.outgoing_reference(1),
            Err(StoreError::ReferenceIndexOutOfBounds { index: 1, degree: 1 })
        ));
    }

    #[test]
    fn verify_detects_mismatch() {
        let obj = leaf(b"a");
        assert!(obj.verify(ReferenceFormat::Blake3V1, &obj.reference()).is_ok());
        let other = leaf(b"b").reference();
        assert!(matches!(
            obj.verify(ReferenceFormat::Blake3V1, &other),
            Err(StoreError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn create_and_decode_message() {
        for encoding in [
            ObjectEncoding::default(),
            ObjectEncoding::new(ReferenceFormat::Blake3V1, Arc::new(ZstdEncoder::default())),
        ] {
            let message: PatchedMessage<Vec<String>, ()> =
                PatchedMessage::new(vec!["a".into(), "b".into()]);
            let (created, params) = encoding.create_object(message).unwrap();
            let decoded: Vec<String> = encoding.decode_message(&created.contents, &params).unwrap();
            assert_eq!(decoded, vec!["a".to_string(), "b".to_string()]);
        }
    }

    #[test]
    fn create_object_carries_patcher_references() {
        let child = leaf(b"child");
        let mut message: PatchedMessage<u32, &str> = PatchedMessage::new(0);
        message.message = message.patcher.add_reference(child.reference(), "child");
        let (created, _) = ObjectEncoding::default().create_object(message).unwrap();
        assert_eq!(created.contents.references().as_ref(), &[child.reference()]);
        assert_eq!(created.metadata, vec!["child"]);
    }
}
