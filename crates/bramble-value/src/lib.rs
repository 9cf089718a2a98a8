//! The Bramble value model and its encode/decode engine.
//!
//! [`Value`] is the closed set of values that can be persisted. Encoding
//! walks a value depth first and produces a [`ValueMsg`] plus the objects
//! it refers to; lists, dicts and depsets are stored as prolly trees
//! (see `bramble-btree`) so that large values are split into bounded
//! objects and unchanged subtrees are shared between versions.
//!
//! Decoding is lazy: a decoded list or dict keeps its root until its
//! elements are first needed, struct fields are decoded on first access,
//! and depsets only read stored subtrees when flattened.
//!
//! # Key Types
//!
//! - [`Value`], [`List`], [`Dict`], [`Struct`] -- the value model
//! - [`Depset`] -- immutable, ordered, deduplicated sets built from direct
//!   elements and other depsets
//! - [`ValueSet`] -- insert-only set keyed by value equality
//! - [`EncodingOptions`] / [`DecodingOptions`] -- explicit per-call
//!   configuration for the engine

pub mod decode;
pub mod depset;
pub mod encode;
pub mod error;
pub mod global;
pub mod labels;
pub mod options;
pub mod path;
pub mod value;
pub mod valueset;
pub mod wire;

pub use decode::{decode_top_level_value, decode_value};
pub use depset::{Depset, DepsetOrder};
pub use encode::{encode_top_level_value, encode_value, EncodedValue, ValueEncoder};
pub use error::{ValueError, ValueResult};
pub use global::{
    Attr, AttrKind, BuildSetting, BuildSettingKind, Definition, Global, GlobalKind, GlobalResolver,
};
pub use options::{BuiltinResolver, DecodingOptions, EncodingOptions, LabelCreator};
pub use path::VisitedPath;
pub use value::{Dict, EncodableValue, Function, Label, List, Struct, Value};
pub use valueset::ValueSet;
pub use wire::{DictEntryMsg, ValueMsg};
