use bramble_types::LocalReference;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(LocalReference),

    /// The object read back does not match the reference it was read by.
    #[error("reference mismatch: requested {expected}, object hashes to {actual}")]
    ReferenceMismatch {
        expected: LocalReference,
        actual: LocalReference,
    },

    /// Serialization failure while creating an object.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The object data is malformed or cannot be decoded.
    #[error("corrupt object {reference}: {reason}")]
    CorruptObject {
        reference: LocalReference,
        reason: String,
    },

    /// Applying or reversing a binary encoding failed.
    #[error("binary encoding error: {0}")]
    Encoding(String),

    #[error("object data of {0} bytes exceeds the maximum object size")]
    ObjectTooLarge(usize),

    #[error("object has {0} outgoing references, exceeding the maximum degree")]
    TooManyReferences(usize),

    #[error("object height exceeds the maximum representable height")]
    HeightOverflow,

    /// A message referred to an outgoing reference the object doesn't have.
    #[error("reference index {index} out of bounds for object with degree {degree}")]
    ReferenceIndexOutOfBounds { index: u32, degree: usize },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
