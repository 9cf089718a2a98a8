//! Foundation types for Bramble.
//!
//! Every object in the Bramble object store is immutable and identified by
//! a reference derived from its contents. This crate defines those
//! references; hashing lives in `bramble-crypto` and storage in
//! `bramble-store`.
//!
//! # Key Types
//!
//! - [`LocalReference`] -- Fully resolved reference: content hash plus size,
//!   height and degree of the referenced object
//! - [`DecodableReference`] -- A local reference plus the parameters needed
//!   to decode the object's binary encoding
//! - [`ReferenceFormat`] -- Which hashing scheme produced a reference

pub mod error;
pub mod reference;

pub use error::TypeError;
pub use reference::{DecodableReference, LocalReference, ReferenceFormat};
