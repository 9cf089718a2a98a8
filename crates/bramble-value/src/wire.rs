//! Wire messages for encoded values.
//!
//! Every reference to another object is a `u32` index into the outgoing
//! references of the object the message ends up in. The
//! [`VisitReferences`] impls let patchers rewrite these indices when
//! messages are merged.

use bramble_btree::Node;
use bramble_store::VisitReferences;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValueMsg {
    None,
    Bool(bool),
    Int(IntMsg),
    Str(String),
    Bytes(Vec<u8>),
    List(TreeMsg<ValueMsg>),
    Tuple(Vec<ValueMsg>),
    /// Entries sorted by the serialized form of their key.
    Dict(TreeMsg<DictEntryMsg>),
    Struct(StructMsg),
    Depset(DepsetMsg),
    Label(String),
    Function(FunctionMsg),
    Builtin(String),
    Global(GlobalMsg),
    Attr(AttrMsg),
}

impl ValueMsg {
    /// Whether decoding this value needs compiled code, either inline or
    /// anywhere below the stored trees it refers to.
    pub fn needs_code(&self) -> bool {
        match self {
            Self::Function(FunctionMsg::Closure { .. }) => true,
            Self::List(tree) => tree.needs_code,
            Self::Dict(tree) => tree.needs_code,
            Self::Depset(d) => d.needs_code,
            Self::Tuple(elements) => elements.iter().any(ValueMsg::needs_code),
            Self::Struct(s) => s.values.iter().any(ValueMsg::needs_code),
            Self::Global(GlobalMsg::Definition { definition, .. }) => {
                definition.attrs.iter().any(|named| named.attr.needs_code())
                    || definition.implementation.as_ref().is_some_and(|i| i.needs_code())
            }
            Self::Attr(attr) => attr.needs_code(),
            _ => false,
        }
    }
}

/// Root of a stored list or dict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeMsg<N> {
    pub nodes: Vec<Node<N>>,
    /// Set when any element, including those in child objects, contains a
    /// closure. Child objects carry no flag of their own.
    pub needs_code: bool,
}

/// Integers that fit in an `i64` are stored inline; larger ones as
/// little-endian two's complement bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntMsg {
    Small(i64),
    Big(Vec<u8>),
}

impl IntMsg {
    pub fn from_bigint(value: &BigInt) -> Self {
        match value.to_i64() {
            Some(small) => Self::Small(small),
            None => Self::Big(value.to_signed_bytes_le()),
        }
    }

    pub fn to_bigint(&self) -> BigInt {
        match self {
            Self::Small(small) => BigInt::from(*small),
            Self::Big(bytes) => BigInt::from_signed_bytes_le(bytes),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DictEntryMsg {
    pub key: ValueMsg,
    pub value: ValueMsg,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructMsg {
    /// Identifier of the provider this struct is an instance of.
    pub provider: Option<String>,
    /// Sorted and unique.
    pub keys: Vec<String>,
    pub values: Vec<ValueMsg>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepsetMsg {
    pub order: u32,
    pub elements: Vec<Node<ValueMsg>>,
    pub needs_code: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionMsg {
    Named(String),
    Closure { name: String, code: Vec<u8> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GlobalMsg {
    /// Refers to a definition stored elsewhere under `identifier`.
    Reference { kind: u32, identifier: String },
    /// The full definition. Its identifier is the one the enclosing value
    /// is being decoded under.
    Definition {
        kind: u32,
        definition: Box<DefinitionMsg>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefinitionMsg {
    pub doc: Option<String>,
    pub fields: Vec<String>,
    pub attrs: Vec<NamedAttrMsg>,
    pub build_setting: Option<BuildSettingMsg>,
    pub implementation: Option<Box<ValueMsg>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedAttrMsg {
    pub name: String,
    pub attr: AttrMsg,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttrMsg {
    pub kind: u32,
    pub mandatory: bool,
    pub default: Option<Box<ValueMsg>>,
}

impl AttrMsg {
    fn needs_code(&self) -> bool {
        self.default.as_ref().is_some_and(|d| d.needs_code())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettingMsg {
    pub kind: u32,
    pub flag: bool,
}

impl VisitReferences for ValueMsg {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
        match self {
            Self::None
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Str(_)
            | Self::Bytes(_)
            | Self::Label(_)
            | Self::Function(_)
            | Self::Builtin(_) => {}
            Self::List(tree) => tree.visit_references(visitor),
            Self::Tuple(elements) => elements.visit_references(visitor),
            Self::Dict(tree) => tree.visit_references(visitor),
            Self::Struct(s) => s.values.visit_references(visitor),
            Self::Depset(d) => d.elements.visit_references(visitor),
            Self::Global(GlobalMsg::Reference { .. }) => {}
            Self::Global(GlobalMsg::Definition { definition, .. }) => {
                definition.visit_references(visitor)
            }
            Self::Attr(attr) => attr.visit_references(visitor),
        }
    }
}

impl<N> VisitReferences for TreeMsg<N>
where
    Node<N>: VisitReferences,
{
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
        self.nodes.visit_references(visitor);
    }
}

impl VisitReferences for DictEntryMsg {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
        self.key.visit_references(visitor);
        self.value.visit_references(visitor);
    }
}

impl VisitReferences for DefinitionMsg {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
        for named in &mut self.attrs {
            named.attr.visit_references(visitor);
        }
        self.implementation.visit_references(visitor);
    }
}

impl VisitReferences for AttrMsg {
    fn visit_references(&mut self, visitor: &mut dyn FnMut(&mut u32)) {
        self.default.visit_references(visitor);
    }
}
