use bramble_types::{LocalReference, ReferenceFormat};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so an object hash can never collide with a hash computed
/// for some other purpose over identical bytes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hasher for objects created under the given reference format.
    pub const fn for_format(format: ReferenceFormat) -> Self {
        match format {
            ReferenceFormat::Blake3V1 => Self::new("bramble-object-v1"),
        }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Hash an object: its outgoing references in order, then its data.
    ///
    /// The reference count is mixed in first so that moving bytes between
    /// the reference list and the data can't produce the same hash.
    pub fn hash_object(&self, references: &[LocalReference], data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(&(references.len() as u64).to_le_bytes());
        for reference in references {
            hasher.update(reference.hash());
            hasher.update(&reference.size_bytes().to_le_bytes());
            hasher.update(&[reference.height()]);
            hasher.update(&reference.degree().to_le_bytes());
        }
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
