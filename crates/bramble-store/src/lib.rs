//! Content-addressed object storage for Bramble.
//!
//! Every value Bramble persists is stored as an immutable object: a blob of
//! encoded data plus an ordered list of outgoing references to other
//! objects. An object's [`LocalReference`](bramble_types::LocalReference)
//! is derived from both, so objects form a Merkle DAG.
//!
//! # Building objects
//!
//! Messages that point at other objects do so through small integer
//! indices into the containing object's outgoing reference list. While a
//! message is being assembled it travels as a [`PatchedMessage`]: the
//! message plus a [`ReferenceMessagePatcher`] recording which references
//! the indices stand for. Once the message is final, an [`ObjectEncoding`]
//! turns it into a [`CreatedObject`], which an [`ObjectCapturer`] either
//! writes to a store or keeps in memory for later upload.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Reads verify the object against the requested reference.
//! 3. Concurrent reads are always safe (objects are immutable).
//! 4. The store never interprets object contents -- it is a pure key-value store.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod capture;
pub mod encoder;
pub mod error;
pub mod memory;
pub mod object;
pub mod patcher;
pub mod reader;
pub mod traits;

pub use capture::{upload_tree, CreatedObjectTree, ObjectCapturer, StoringCapturer, TreeCapturer};
pub use encoder::{BinaryEncoder, EncoderConfig, IdentityEncoder, ZstdEncoder};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{CreatedObject, ObjectContents, ObjectEncoding};
pub use patcher::{PatchedMessage, ReferenceMessagePatcher, VisitReferences};
pub use reader::{Message, ObjectReader};
pub use traits::ObjectStore;
