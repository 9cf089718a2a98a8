//! Prolly B-trees stored in the Bramble object store.
//!
//! Large sequences (list elements, dict entries, depset elements) are
//! stored as trees of objects. Each level of the tree is a list of
//! [`Node`]s: either a leaf carrying an element, or a parent pointing at an
//! object that holds the next level down. Concatenating the leaves of all
//! parents in order yields the original sequence.
//!
//! - [`Builder`] accumulates leaves and flushes them into objects whenever
//!   a [`ProllyChunker`] finds a boundary, returning a bounded root list.
//! - [`AllLeaves`] walks a root list lazily, fetching parent objects only
//!   when iteration reaches them.

pub mod builder;
pub mod chunker;
pub mod error;
pub mod leaves;
pub mod limits;
pub mod node;

pub use builder::{Builder, CountingParentNodeComputer, ParentNodeComputer};
pub use chunker::ProllyChunker;
pub use error::{BTreeError, BTreeResult};
pub use leaves::{resolve_parent, AllLeaves};
pub use limits::ObjectSizeLimits;
pub use node::{total_leaf_count, Node, ParentNode};
