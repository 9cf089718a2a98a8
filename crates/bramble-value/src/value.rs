use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, OnceLock, RwLock};

use bramble_btree::{total_leaf_count, Node};
use bramble_store::Message;
use num_bigint::BigInt;

use crate::decode;
use crate::depset::Depset;
use crate::error::{ValueError, ValueResult};
use crate::global::{Attr, Global};
use crate::options::DecodingOptions;
use crate::wire::{DictEntryMsg, ValueMsg};

/// A value that is not part of the closed [`Value`] set but can still be
/// encoded by lowering it into one.
pub trait EncodableValue: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    /// The value to encode in place of `self`, or `None` if it has no
    /// encoded form.
    fn lower(&self) -> Option<Value>;
}

/// A dynamically typed value.
///
/// Lists, dicts, structs and depsets have reference semantics: cloning a
/// `Value` shares the underlying container.
#[derive(Clone, Debug)]
pub enum Value {
    None,
    Bool(bool),
    Int(BigInt),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    List(List),
    Tuple(Arc<[Value]>),
    Dict(Dict),
    Struct(Struct),
    Depset(Depset),
    Label(Label),
    Function(Function),
    Builtin(Arc<str>),
    Global(Global),
    Attr(Attr),
    Opaque(Arc<dyn EncodableValue>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }

    pub fn int(i: i64) -> Self {
        Self::Int(BigInt::from(i))
    }

    pub fn tuple(elements: Vec<Value>) -> Self {
        Self::Tuple(elements.into())
    }

    pub fn list(elements: Vec<Value>) -> Self {
        Self::List(List::new(elements))
    }

    pub fn type_name(&self) -> String {
        match self {
            Self::None => "NoneType".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int(_) => "int".into(),
            Self::Str(_) => "string".into(),
            Self::Bytes(_) => "bytes".into(),
            Self::List(_) => "list".into(),
            Self::Tuple(_) => "tuple".into(),
            Self::Dict(_) => "dict".into(),
            Self::Struct(_) => "struct".into(),
            Self::Depset(_) => "depset".into(),
            Self::Label(_) => "Label".into(),
            Self::Function(_) => "function".into(),
            Self::Builtin(_) => "builtin_function_or_method".into(),
            Self::Global(global) => global.kind().name().into(),
            Self::Attr(_) => "Attribute".into(),
            Self::Opaque(opaque) => opaque.type_name().into(),
        }
    }

    /// Short human-readable form, used to name dict keys in errors.
    pub fn describe(&self) -> String {
        match self {
            Self::None => "None".into(),
            Self::Bool(true) => "True".into(),
            Self::Bool(false) => "False".into(),
            Self::Int(i) => i.to_string(),
            Self::Str(s) => format!("{s:?}"),
            Self::Label(label) => format!("Label({:?})", label.as_str()),
            other => format!("<{}>", other.type_name()),
        }
    }

    /// Hash consistent with [`equals`](Self::equals). Fails for mutable
    /// containers.
    pub fn hash_value(&self) -> ValueResult<u64> {
        let mut hasher = DefaultHasher::new();
        self.hash_into(&mut hasher)?;
        Ok(hasher.finish())
    }

    fn hash_into(&self, hasher: &mut DefaultHasher) -> ValueResult<()> {
        match self {
            Self::None => 0u8.hash(hasher),
            Self::Bool(b) => (1u8, b).hash(hasher),
            Self::Int(i) => (2u8, i).hash(hasher),
            Self::Str(s) => (3u8, s).hash(hasher),
            Self::Bytes(b) => (4u8, b).hash(hasher),
            Self::Tuple(elements) => {
                (5u8, elements.len()).hash(hasher);
                for element in elements.iter() {
                    element.hash_into(hasher)?;
                }
            }
            Self::Label(label) => (6u8, label).hash(hasher),
            Self::Function(function) => (7u8, function).hash(hasher),
            Self::Builtin(name) => (8u8, name).hash(hasher),
            Self::Global(global) => (9u8, global.kind(), global.identifier()).hash(hasher),
            Self::Depset(depset) => (10u8, depset.hash_seed()).hash(hasher),
            Self::Struct(s) => {
                (11u8, s.provider().map(Global::identifier), s.keys()).hash(hasher);
                for index in 0..s.len() {
                    s.field_at(index)?.hash_into(hasher)?;
                }
            }
            Self::Opaque(opaque) => match opaque.lower() {
                Some(lowered) => lowered.hash_into(hasher)?,
                None => return Err(ValueError::Unhashable(opaque.type_name().into())),
            },
            Self::List(_) | Self::Dict(_) | Self::Attr(_) => {
                return Err(ValueError::Unhashable(self.type_name()))
            }
        }
        Ok(())
    }

    /// Deep equality. Lazily encoded containers are decoded as needed,
    /// which can fail.
    pub fn equals(&self, other: &Value) -> ValueResult<bool> {
        Ok(match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Label(a), Self::Label(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a == b,
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Global(a), Self::Global(b)) => a == b,
            (Self::Depset(a), Self::Depset(b)) => a.ptr_eq(b),
            (Self::Tuple(a), Self::Tuple(b)) => sequences_equal(a, b)?,
            (Self::List(a), Self::List(b)) => {
                a.ptr_eq(b) || sequences_equal(&a.elements()?, &b.elements()?)?
            }
            (Self::Dict(a), Self::Dict(b)) => a.ptr_eq(b) || a.equals(b)?,
            (Self::Struct(a), Self::Struct(b)) => a.equals(b)?,
            (Self::Attr(a), Self::Attr(b)) => a.equals(b)?,
            (Self::Opaque(a), Self::Opaque(b)) if Arc::ptr_eq(a, b) => true,
            (Self::Opaque(a), other) => match a.lower() {
                Some(lowered) => lowered.equals(other)?,
                None => false,
            },
            (value, Self::Opaque(b)) => match b.lower() {
                Some(lowered) => value.equals(&lowered)?,
                None => false,
            },
            _ => false,
        })
    }
}

fn sequences_equal(a: &[Value], b: &[Value]) -> ValueResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.equals(y)? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::int(i)
    }
}

impl From<BigInt> for Value {
    fn from(i: BigInt) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<Label> for Value {
    fn from(label: Label) -> Self {
        Self::Label(label)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Self::List(list)
    }
}

impl From<Dict> for Value {
    fn from(dict: Dict) -> Self {
        Self::Dict(dict)
    }
}

impl From<Struct> for Value {
    fn from(s: Struct) -> Self {
        Self::Struct(s)
    }
}

impl From<Depset> for Value {
    fn from(depset: Depset) -> Self {
        Self::Depset(depset)
    }
}

impl From<Global> for Value {
    fn from(global: Global) -> Self {
        Self::Global(global)
    }
}

/// A canonical label string such as `@repo//pkg:target`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(Arc<str>);

impl Label {
    pub fn parse(s: &str) -> ValueResult<Self> {
        if (s.starts_with("//") || s.starts_with('@')) && !s.contains('\0') {
            Ok(Self(Arc::from(s)))
        } else {
            Err(ValueError::InvalidLabel(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A function value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    /// A function reachable through a globally known identifier.
    Named(Arc<str>),
    /// A function that can only be reconstructed from its compiled code.
    Closure { name: Arc<str>, code: Arc<[u8]> },
}

/// A list or dict root that has not been decoded yet.
#[derive(Clone)]
pub(crate) struct EncodedTree<N> {
    pub root: Message<Vec<Node<N>>>,
    pub needs_code: bool,
    pub options: DecodingOptions,
    pub current_identifier: Option<Arc<str>>,
}

enum ListState {
    Materialized(Vec<Value>),
    Encoded(EncodedTree<ValueMsg>),
}

pub(crate) enum ListSnapshot {
    Materialized(Vec<Value>),
    Encoded(EncodedTree<ValueMsg>),
}

/// A mutable list.
#[derive(Clone)]
pub struct List(Arc<RwLock<ListState>>);

impl List {
    pub fn new(elements: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(ListState::Materialized(elements))))
    }

    pub(crate) fn encoded(tree: EncodedTree<ValueMsg>) -> Self {
        Self(Arc::new(RwLock::new(ListState::Encoded(tree))))
    }

    /// Number of elements. Does not decode an encoded list.
    pub fn len(&self) -> u64 {
        match &*self.0.read().expect("lock poisoned") {
            ListState::Materialized(elements) => elements.len() as u64,
            ListState::Encoded(tree) => total_leaf_count(&tree.root.message),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_materialized(&self) -> bool {
        matches!(
            &*self.0.read().expect("lock poisoned"),
            ListState::Materialized(_)
        )
    }

    /// All elements, decoding the list on first access.
    pub fn elements(&self) -> ValueResult<Vec<Value>> {
        self.with_elements(|elements| elements.clone())
    }

    pub fn push(&self, value: Value) -> ValueResult<()> {
        self.with_elements(|elements| elements.push(value))
    }

    fn with_elements<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> ValueResult<R> {
        let pending = match &*self.0.read().expect("lock poisoned") {
            ListState::Materialized(_) => None,
            ListState::Encoded(tree) => Some(tree.clone()),
        };
        let decoded = pending.map(|tree| decode::decode_list(&tree)).transpose()?;
        let mut state = self.0.write().expect("lock poisoned");
        if let (ListState::Encoded(_), Some(elements)) = (&*state, decoded) {
            *state = ListState::Materialized(elements);
        }
        match &mut *state {
            ListState::Materialized(elements) => Ok(f(elements)),
            ListState::Encoded(_) => Err(ValueError::Corrupt("list was not materialized".into())),
        }
    }

    pub(crate) fn snapshot(&self) -> ListSnapshot {
        match &*self.0.read().expect("lock poisoned") {
            ListState::Materialized(elements) => ListSnapshot::Materialized(elements.clone()),
            ListState::Encoded(tree) => ListSnapshot::Encoded(tree.clone()),
        }
    }

    /// Identity of the underlying container.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &List) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.read().expect("lock poisoned") {
            ListState::Materialized(elements) => f.debug_list().entries(elements).finish(),
            ListState::Encoded(tree) => f
                .debug_struct("List")
                .field("encoded_len", &total_leaf_count(&tree.root.message))
                .finish(),
        }
    }
}

/// Insertion-ordered entries with a hash index over the keys.
#[derive(Clone, Default)]
pub(crate) struct DictEntries {
    entries: Vec<(Value, Value)>,
    index: HashMap<u64, Vec<usize>>,
}

impl DictEntries {
    pub fn insert(&mut self, key: Value, value: Value) -> ValueResult<()> {
        let hash = key.hash_value()?;
        let slots = self.index.entry(hash).or_default();
        for &slot in slots.iter() {
            if self.entries[slot].0.equals(&key)? {
                self.entries[slot].1 = value;
                return Ok(());
            }
        }
        slots.push(self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    pub fn get(&self, key: &Value) -> ValueResult<Option<Value>> {
        let hash = key.hash_value()?;
        if let Some(slots) = self.index.get(&hash) {
            for &slot in slots {
                if self.entries[slot].0.equals(key)? {
                    return Ok(Some(self.entries[slot].1.clone()));
                }
            }
        }
        Ok(None)
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }
}

enum DictState {
    Materialized(DictEntries),
    Encoded(EncodedTree<DictEntryMsg>),
}

pub(crate) enum DictSnapshot {
    Materialized(Vec<(Value, Value)>),
    Encoded(EncodedTree<DictEntryMsg>),
}

/// A mutable dict. Keys must be hashable.
#[derive(Clone)]
pub struct Dict(Arc<RwLock<DictState>>);

impl Default for Dict {
    fn default() -> Self {
        Self::new()
    }
}

impl Dict {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(DictState::Materialized(
            DictEntries::default(),
        ))))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> ValueResult<Self> {
        let mut materialized = DictEntries::default();
        for (key, value) in entries {
            materialized.insert(key, value)?;
        }
        Ok(Self(Arc::new(RwLock::new(DictState::Materialized(
            materialized,
        )))))
    }

    pub(crate) fn encoded(tree: EncodedTree<DictEntryMsg>) -> Self {
        Self(Arc::new(RwLock::new(DictState::Encoded(tree))))
    }

    pub fn len(&self) -> u64 {
        match &*self.0.read().expect("lock poisoned") {
            DictState::Materialized(entries) => entries.entries().len() as u64,
            DictState::Encoded(tree) => total_leaf_count(&tree.root.message),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&self, key: Value, value: Value) -> ValueResult<()> {
        self.with_entries(|entries| entries.insert(key, value))?
    }

    pub fn get(&self, key: &Value) -> ValueResult<Option<Value>> {
        self.with_entries(|entries| entries.get(key))?
    }

    pub fn entries(&self) -> ValueResult<Vec<(Value, Value)>> {
        self.with_entries(|entries| entries.entries().to_vec())
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut DictEntries) -> R) -> ValueResult<R> {
        let pending = match &*self.0.read().expect("lock poisoned") {
            DictState::Materialized(_) => None,
            DictState::Encoded(tree) => Some(tree.clone()),
        };
        let decoded = pending.map(|tree| decode::decode_dict(&tree)).transpose()?;
        let mut state = self.0.write().expect("lock poisoned");
        if let (DictState::Encoded(_), Some(entries)) = (&*state, decoded) {
            *state = DictState::Materialized(entries);
        }
        match &mut *state {
            DictState::Materialized(entries) => Ok(f(entries)),
            DictState::Encoded(_) => Err(ValueError::Corrupt("dict was not materialized".into())),
        }
    }

    pub(crate) fn snapshot(&self) -> DictSnapshot {
        match &*self.0.read().expect("lock poisoned") {
            DictState::Materialized(entries) => {
                DictSnapshot::Materialized(entries.entries().to_vec())
            }
            DictState::Encoded(tree) => DictSnapshot::Encoded(tree.clone()),
        }
    }

    fn equals(&self, other: &Dict) -> ValueResult<bool> {
        let entries = self.entries()?;
        if entries.len() as u64 != other.len() {
            return Ok(false);
        }
        for (key, value) in &entries {
            match other.get(key)? {
                Some(other_value) if value.equals(&other_value)? => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Dict) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.read().expect("lock poisoned") {
            DictState::Materialized(entries) => f
                .debug_map()
                .entries(entries.entries().iter().map(|(k, v)| (k, v)))
                .finish(),
            DictState::Encoded(tree) => f
                .debug_struct("Dict")
                .field("encoded_len", &total_leaf_count(&tree.root.message))
                .finish(),
        }
    }
}

/// One field of a struct. A decoded struct keeps the encoded form of each
/// field and decodes it at most once.
pub(crate) struct StructField {
    encoded: Option<Message<ValueMsg>>,
    decoded: OnceLock<Value>,
}

impl StructField {
    pub fn decoded(&self) -> Option<&Value> {
        self.decoded.get()
    }

    pub fn encoded(&self) -> Option<&Message<ValueMsg>> {
        self.encoded.as_ref()
    }
}

struct StructInner {
    provider: Option<Global>,
    keys: Vec<String>,
    fields: Vec<StructField>,
    options: Option<DecodingOptions>,
    current_identifier: Option<Arc<str>>,
}

/// An immutable struct, optionally an instance of a provider.
#[derive(Clone)]
pub struct Struct(Arc<StructInner>);

impl Struct {
    /// Fields are sorted by name; for duplicate names the last one wins.
    pub fn new(provider: Option<Global>, fields: impl IntoIterator<Item = (String, Value)>) -> Self {
        let sorted: BTreeMap<String, Value> = fields.into_iter().collect();
        let (keys, fields): (Vec<String>, Vec<StructField>) = sorted
            .into_iter()
            .map(|(key, value)| {
                (
                    key,
                    StructField {
                        encoded: None,
                        decoded: OnceLock::from(value),
                    },
                )
            })
            .unzip();
        Self(Arc::new(StructInner {
            provider,
            keys,
            fields,
            options: None,
            current_identifier: None,
        }))
    }

    pub(crate) fn encoded(
        provider: Option<Global>,
        keys: Vec<String>,
        values: Vec<Message<ValueMsg>>,
        options: DecodingOptions,
        current_identifier: Option<Arc<str>>,
    ) -> Self {
        let fields = values
            .into_iter()
            .map(|message| StructField {
                encoded: Some(message),
                decoded: OnceLock::new(),
            })
            .collect();
        Self(Arc::new(StructInner {
            provider,
            keys,
            fields,
            options: Some(options),
            current_identifier,
        }))
    }

    pub fn provider(&self) -> Option<&Global> {
        self.0.provider.as_ref()
    }

    pub fn keys(&self) -> &[String] {
        &self.0.keys
    }

    pub fn len(&self) -> usize {
        self.0.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.keys.is_empty()
    }

    pub fn get(&self, name: &str) -> ValueResult<Value> {
        let index = self
            .0
            .keys
            .binary_search_by(|key| key.as_str().cmp(name))
            .map_err(|_| ValueError::StructFieldNotFound(name.to_string()))?;
        self.field_at(index)
    }

    pub(crate) fn field_at(&self, index: usize) -> ValueResult<Value> {
        let key = &self.0.keys[index];
        let field = &self.0.fields[index];
        if let Some(value) = field.decoded.get() {
            return Ok(value.clone());
        }
        let (Some(message), Some(options)) = (&field.encoded, &self.0.options) else {
            return Err(ValueError::StructFieldNotFound(key.clone()));
        };
        let value = decode::decode_value(message, self.0.current_identifier.as_deref(), options)
            .map_err(|e| e.in_field(key.as_str()))?;
        Ok(field.decoded.get_or_init(|| value).clone())
    }

    pub(crate) fn fields(&self) -> impl Iterator<Item = (&str, &StructField)> {
        self.0
            .keys
            .iter()
            .map(String::as_str)
            .zip(self.0.fields.iter())
    }

    fn equals(&self, other: &Struct) -> ValueResult<bool> {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ok(true);
        }
        if self.0.provider != other.0.provider || self.0.keys != other.0.keys {
            return Ok(false);
        }
        for index in 0..self.len() {
            if !self.field_at(index)?.equals(&other.field_at(index)?)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Struct")
            .field("provider", &self.0.provider.as_ref().map(Global::identifier))
            .field("keys", &self.0.keys)
            .finish()
    }
}
